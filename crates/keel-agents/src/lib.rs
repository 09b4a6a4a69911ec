//! Outbound lead communication runtime.
//!
//! Wires the I/O-free pieces from `coordination` to real providers:
//!
//! | Module          | Role                                                   |
//! |-----------------|--------------------------------------------------------|
//! | `config`        | env + TOML configuration                               |
//! | `errors`        | `OutreachError` with retry classification              |
//! | `transport`     | OpenRouter / Mailgun / Twilio over `reqwest`           |
//! | `model_router`  | complexity-tiered, breaker-guarded LLM routing         |
//! | `channels`      | email / SMS senders with simulation mode               |
//! | `repository`    | lead / campaign / decision persistence                 |
//! | `overlord`      | channel assignment and qualification decisions         |
//! | `content`       | per-lead step personalization                          |
//! | `scheduler`     | campaign step scheduling and execution                 |
//! | `telemetry`     | per-tick reports                                       |
//! | `seed`          | JSON seed data for the in-memory repository            |

#![allow(clippy::uninlined_format_args)]

pub mod channels;
pub mod config;
pub mod content;
pub mod errors;
pub mod model_router;
pub mod overlord;
pub mod repository;
pub mod scheduler;
pub mod seed;
pub mod telemetry;
pub mod transport;

use std::sync::Arc;

use coordination::{BreakerRegistry, EventBus, ServiceName, SharedEventBus};
use tracing::info;

use crate::channels::{EmailSender, SmsSender};
use crate::config::OutreachConfig;
use crate::content::ContentAgent;
use crate::errors::OutreachError;
use crate::model_router::ModelRouter;
use crate::overlord::Overlord;
use crate::repository::LeadRepository;
use crate::scheduler::CampaignScheduler;
use crate::transport::{
    EmailTransport, LlmTransport, MailgunTransport, OpenRouterTransport, SmsTransport,
    TwilioTransport,
};

/// Every service, constructed once and shared by reference.
pub struct OutreachRuntime {
    pub bus: SharedEventBus,
    pub breakers: BreakerRegistry,
    pub router: Arc<ModelRouter>,
    pub overlord: Overlord,
    pub scheduler: Arc<CampaignScheduler>,
}

impl OutreachRuntime {
    /// Build the runtime. Missing provider credentials select simulation.
    pub fn build(
        config: &OutreachConfig,
        repo: Arc<dyn LeadRepository>,
    ) -> Result<Self, OutreachError> {
        config.validate().map_err(OutreachError::Configuration)?;

        let bus = EventBus::new().shared();
        let breakers = BreakerRegistry::with_defaults(Some(bus.clone()));
        let timeout = config.http_timeout();

        let llm: Option<Arc<dyn LlmTransport>> = match &config.openrouter {
            Some(settings) => Some(Arc::new(OpenRouterTransport::new(settings.clone(), timeout)?)),
            None => None,
        };
        let mailer: Option<Arc<dyn EmailTransport>> = match &config.mailgun {
            Some(settings) => Some(Arc::new(MailgunTransport::new(settings.clone(), timeout)?)),
            None => None,
        };
        let sms: Option<Arc<dyn SmsTransport>> = match &config.twilio {
            Some(settings) => Some(Arc::new(TwilioTransport::new(settings.clone(), timeout)?)),
            None => None,
        };

        info!(
            openrouter = llm.is_some(),
            mailgun = mailer.is_some(),
            twilio = sms.is_some(),
            "Providers configured (absent ones are simulated)"
        );

        let router = Arc::new(ModelRouter::new(
            llm,
            breakers.get(ServiceName::OpenRouter),
            config.router.clone(),
        ));
        let overlord = Overlord::new(router.clone(), repo.clone()).with_event_bus(bus.clone());

        let mut scheduler = CampaignScheduler::new(repo.clone(), config.scheduler.clone())
            .with_sender(Arc::new(EmailSender::new(
                mailer,
                breakers.get(ServiceName::Mailgun),
                repo.clone(),
            )))
            .with_sender(Arc::new(SmsSender::new(
                sms,
                breakers.get(ServiceName::Twilio),
                repo.clone(),
            )))
            .with_content_agent(Arc::new(ContentAgent::new(router.clone())))
            .with_event_bus(bus.clone());
        if let Some(path) = &config.telemetry_path {
            scheduler = scheduler.with_telemetry_path(path.clone());
        }

        Ok(Self {
            bus,
            breakers,
            router,
            overlord,
            scheduler: Arc::new(scheduler),
        })
    }
}
