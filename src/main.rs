use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Local;
use serde::Serialize;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use inbox_automations::app::{AutomationConfigs, AutomationDeps, Automations};
use inbox_automations::automations::SendOrigin;
use inbox_automations::automations::unsubscribe::{install_form_trigger, remove_form_trigger};
use inbox_automations::channels::{EmailConfig, ImapSmtpMailbox};
use inbox_automations::config::{
    ErasureConfig, NewsletterConfig, ResponderConfig, RuntimeConfig, UnsubscribeConfig,
};
use inbox_automations::contacts::JsonContacts;
use inbox_automations::forms::FormResponseStore;
use inbox_automations::pipeline::responder::{install_responder_trigger, remove_responder_trigger};
use inbox_automations::privacy::Redactor;
use inbox_automations::scheduler::{self, JobScheduler, TriggerHandler};
use inbox_automations::server;

const USAGE: &str = "\
usage: inbox-automations <command> [args]

  respond                      run the auto-responder once
  erase [address]              erase everything about an address (default: configured target)
  erase-preview <address>      list the contacts an erasure would delete
  erase-test                   send the erasure confirmation to the test address
  newsletter-send              send the newsletter now
  newsletter-schedule          schedule the newsletter at the configured time
  newsletter-status            list scheduled newsletter sends
  newsletter-cancel            cancel scheduled newsletter sends
  contacts                     overview of newsletter recipients
  groups                       list contact groups
  setup-responder              install the periodic responder trigger
  remove-responder             remove the responder trigger
  setup-form                   install the unsubscribe form trigger
  remove-form                  remove the unsubscribe form trigger
  serve                        run the trigger ticker and webhook server";

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let runtime = RuntimeConfig::from_env()?;

    // Console logging, plus a daily rolling file when a log dir is set
    let (file_layer, _log_guard) = match &runtime.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-automations.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    // ── Collaborators ────────────────────────────────────────────────────
    let email_config = EmailConfig::from_env().context("mail account not configured")?;
    let mail = Arc::new(ImapSmtpMailbox::new(email_config));
    let contacts = Arc::new(
        JsonContacts::open(&runtime.contacts_path)
            .await
            .with_context(|| format!("opening {}", runtime.contacts_path.display()))?,
    );
    let scheduler = Arc::new(
        JobScheduler::open(&runtime.schedule_path)
            .await
            .with_context(|| format!("opening {}", runtime.schedule_path.display()))?,
    );

    let deps = AutomationDeps {
        mail,
        contacts,
        forms: Arc::new(FormResponseStore::new()),
        scheduler: Arc::clone(&scheduler),
    };
    let configs = AutomationConfigs {
        responder: ResponderConfig::from_env()?,
        erasure: ErasureConfig::from_env()?,
        newsletter: NewsletterConfig::from_env()?,
        unsubscribe: UnsubscribeConfig::from_env()?,
        redactor: Redactor::new(runtime.debug),
    };
    let automations = Arc::new(Automations::new(deps, configs));

    match command {
        "respond" => print_json(&automations.responder.run().await?)?,
        "erase" => {
            let report = match args.get(1) {
                Some(address) => automations.eraser.erase(address).await?,
                None => automations.eraser.erase_configured().await?,
            };
            print_json(&report)?;
        }
        "erase-preview" => {
            let Some(address) = args.get(1) else {
                bail!("erase-preview needs an address");
            };
            let people = automations.eraser.preview_contacts(address).await?;
            println!("{} contact(s) would be deleted", people.len());
            for person in &people {
                println!(
                    "  {} ({})",
                    person.display_name().unwrap_or("(no name)"),
                    person.resource_name
                );
            }
        }
        "erase-test" => {
            automations.eraser.send_test_confirmation().await?;
            println!("Test confirmation sent");
        }
        "newsletter-send" => {
            print_json(&automations.newsletter.send(SendOrigin::Manual).await?)?
        }
        "newsletter-schedule" => {
            print_json(&automations.newsletter.schedule(Local::now()).await?)?
        }
        "newsletter-status" => {
            let pending = automations.newsletter.scheduled().await;
            if pending.is_empty() {
                println!("No newsletter scheduled");
            } else {
                print_json(&pending)?;
            }
        }
        "newsletter-cancel" => {
            let removed = automations.newsletter.cancel().await?;
            println!("{removed} scheduled send(s) cancelled");
        }
        "contacts" => print_json(&automations.newsletter.contact_overview().await?)?,
        "groups" => {
            for group in automations.newsletter.contact_groups().await? {
                println!("{group}");
            }
        }
        "setup-responder" => {
            let config = automations.responder.config();
            print_json(&install_responder_trigger(&scheduler, config).await?)?;
        }
        "remove-responder" => {
            let removed = remove_responder_trigger(&scheduler).await?;
            println!("{removed} responder trigger(s) removed");
        }
        "setup-form" => {
            let config = automations.unsubscriber.config();
            print_json(&install_form_trigger(&scheduler, config).await?)?;
        }
        "remove-form" => {
            let removed = remove_form_trigger(&scheduler).await?;
            println!("{removed} form trigger(s) removed");
        }
        "serve" => {
            eprintln!("📬 Inbox automations v{}", env!("CARGO_PKG_VERSION"));
            eprintln!("   Webhook: http://0.0.0.0:{}/forms/{{form_id}}/submit", runtime.http_port);
            eprintln!("   Triggers: {}", scheduler.list().await.len());

            let handler: Arc<dyn TriggerHandler> = automations.clone();
            let _ticker = scheduler::spawn_ticker(
                Arc::clone(&scheduler),
                handler,
                runtime.tick_interval,
            );
            server::serve(automations, runtime.http_port).await?;
        }
        other => {
            eprintln!("unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
