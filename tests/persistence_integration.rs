//! End-to-end runs against the file-backed contact book and trigger registry.

use std::sync::Arc;
use std::time::Duration;

use inbox_automations::app::{AutomationConfigs, AutomationDeps, Automations};
use inbox_automations::channels::{Draft, InMemoryMailbox, MailMessage, MailThread};
use inbox_automations::config::{ErasureConfig, Pacing};
use inbox_automations::contacts::{ContactsDirectory, JsonContacts};
use inbox_automations::forms::FormResponseStore;
use inbox_automations::pipeline::responder::install_responder_trigger;
use inbox_automations::scheduler::{Handler, JobScheduler, TriggerHandler, TriggerSchedule};

const ME: &str = "team@haptigation.de";

fn message(from: &str, subject: &str) -> MailMessage {
    MailMessage {
        from: from.into(),
        subject: Some(subject.into()),
        plain_body: Some("Hallo".into()),
        html_body: None,
        is_unread: true,
    }
}

async fn automations(
    dir: &tempfile::TempDir,
    mailbox: &Arc<InMemoryMailbox>,
) -> (Automations, Arc<JsonContacts>) {
    let contacts = Arc::new(JsonContacts::open(dir.path().join("contacts.json")).await.unwrap());
    let scheduler = Arc::new(JobScheduler::open(dir.path().join("triggers.json")).await.unwrap());
    let deps = AutomationDeps {
        mail: mailbox.clone(),
        contacts: contacts.clone(),
        forms: Arc::new(FormResponseStore::new()),
        scheduler,
    };
    let configs = AutomationConfigs {
        erasure: ErasureConfig {
            start_delay: Duration::ZERO,
            pacing: Pacing::none(),
            ..Default::default()
        },
        ..Default::default()
    };
    (Automations::new(deps, configs), contacts)
}

#[tokio::test]
async fn responder_trigger_survives_restart_and_fires() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(InMemoryMailbox::new(ME));
    mailbox.add_draft(Draft {
        id: "d1".into(),
        subject: "E-Mail Response Automation Draft - DO NOT DELETE".into(),
        plain_body: "Danke für Ihre Nachricht!".into(),
        html_body: None,
        attachments: vec![],
    });
    mailbox.add_thread(MailThread {
        id: "t1".into(),
        messages: vec![message("jane@example.com", "Frage")],
    });

    {
        let (automations, _) = automations(&dir, &mailbox).await;
        let config = automations.responder.config().clone();
        install_responder_trigger(automations.scheduler(), &config).await.unwrap();
        install_responder_trigger(automations.scheduler(), &config).await.unwrap();
    }

    let (automations, _) = automations(&dir, &mailbox).await;
    let triggers = automations.scheduler().list().await;
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].handler, Handler::AutoRespond);
    assert_eq!(triggers[0].schedule, TriggerSchedule::EveryMinutes { minutes: 1 });

    automations.fire(&triggers[0]).await;
    automations.fire(&triggers[0]).await;
    assert_eq!(mailbox.sent().len(), 1);
    assert_eq!(mailbox.sent()[0].subject, "Re: Frage");
}

#[tokio::test]
async fn erasure_persists_contact_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(InMemoryMailbox::new(ME));
    mailbox.add_draft(Draft {
        id: "d1".into(),
        subject: "Confirm User Data Deletion Draft - DO NOT DELETE".into(),
        plain_body: "Die Daten von {EMAIL} wurden gelöscht.".into(),
        html_body: None,
        attachments: vec![],
    });
    mailbox.add_thread(MailThread {
        id: "t1".into(),
        messages: vec![message("Max <max@example.com>", "Hallo")],
    });
    mailbox.add_thread(MailThread {
        id: "t2".into(),
        messages: vec![message("other@example.com", "Hallo")],
    });

    {
        let (_, contacts) = automations(&dir, &mailbox).await;
        contacts.add_person("Max", &["Max@Example.com"]).await.unwrap();
        contacts.add_person("Other", &["other@example.com"]).await.unwrap();
    }

    let (automations, _) = automations(&dir, &mailbox).await;
    let report = automations.eraser.erase("max@example.com").await.unwrap();
    assert!(report.confirmation_sent);
    assert_eq!(report.contacts_deleted, 1);
    assert_eq!(report.threads_deleted, 1);
    assert!(report.errors.is_empty());
    assert!(mailbox.is_trashed("t1"));
    assert!(!mailbox.is_trashed("t2"));

    let sent = mailbox.sent();
    assert_eq!(sent[0].to, "max@example.com");
    assert_eq!(sent[0].plain_body, "Die Daten von max@example.com wurden gelöscht.");

    let reopened = JsonContacts::open(dir.path().join("contacts.json")).await.unwrap();
    let remaining = reopened.connections().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].names, vec!["Other".to_string()]);
}
