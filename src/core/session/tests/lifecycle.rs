use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Notify;

use super::*;
use crate::core::session::{SessionEvent, StartOutcome};
use crate::core::task::{StartRejection, TaskState};
use crate::core::transcript::{EntryKind, Role};

#[tokio::test(start_paused = true)]
async fn user_entry_lands_before_the_network_call() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(
        ScriptedGateway::new(AckScript::Processing, vec![StatusStep::Report(completed("ok"))])
            .gated_submit(gate.clone()),
    );
    let session = session(&gateway);

    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start("  book a table  ").await })
    };
    gateway.submit_entered.notified().await;

    let entries = session.transcript().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].role, Role::User);
    assert_eq!(entries[0].content, "book a table");
    assert_eq!(session.state().await, TaskState::Starting);

    gate.notify_one();
    assert_eq!(
        starter.await.unwrap(),
        StartOutcome::Processing {
            task_id: "exec-1".into()
        }
    );
    let request = gateway.requests.lock().unwrap()[0].clone();
    assert_eq!(request.instruction, "book a table");
    assert_eq!(request.agent_type, "browser_use");
}

#[tokio::test(start_paused = true)]
async fn busy_start_is_a_noop_with_notice() {
    let gate = Arc::new(Notify::new());
    let gateway =
        Arc::new(ScriptedGateway::new(AckScript::Processing, vec![]).gated_submit(gate.clone()));
    let session = session(&gateway);
    let mut events = session.subscribe();

    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start("first").await })
    };
    gateway.submit_entered.notified().await;

    let outcome = session.start("second").await;
    assert_eq!(
        outcome,
        StartOutcome::Rejected(StartRejection::Busy(TaskState::Starting))
    );
    assert_eq!(gateway.submits.load(Ordering::SeqCst), 1);
    assert_eq!(session.transcript().await.len(), 1);

    let mut saw_notice = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Notice(text) = event {
            saw_notice = text.contains("already starting");
        }
    }
    assert!(saw_notice);

    gate.notify_one();
    starter.await.unwrap();
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn busy_start_while_paused_is_rejected() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(ScriptedGateway::new(
        AckScript::Processing,
        vec![StatusStep::Gated(gate.clone(), completed("done"))],
    ));
    let session = session(&gateway);
    let mut events = session.subscribe();

    session.start("first").await;
    assert_eq!(session.toggle_pause().await, Some(TaskState::Paused));

    let outcome = session.start("second").await;
    assert_eq!(
        outcome,
        StartOutcome::Rejected(StartRejection::Busy(TaskState::Paused))
    );
    assert_eq!(gateway.submits.load(Ordering::SeqCst), 1);
    assert_eq!(session.state().await, TaskState::Paused);
    assert!(
        !session
            .transcript()
            .await
            .iter()
            .any(|e| e.content == "second")
    );

    let mut saw_notice = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Notice(text) = event {
            saw_notice |= text.contains("already paused");
        }
    }
    assert!(saw_notice);

    session.stop().await;
    gate.notify_one();
}

#[tokio::test(start_paused = true)]
async fn empty_instruction_is_rejected() {
    let gateway = Arc::new(ScriptedGateway::new(AckScript::Processing, vec![]));
    let session = session(&gateway);
    assert_eq!(
        session.start("   ").await,
        StartOutcome::Rejected(StartRejection::EmptyInstruction)
    );
    assert!(session.transcript().await.is_empty());
    assert_eq!(gateway.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn submission_failure_becomes_a_transcript_entry() {
    let gateway = Arc::new(ScriptedGateway::new(
        AckScript::Error("connection refused"),
        vec![],
    ));
    let session = session(&gateway);

    let outcome = session.start("go").await;
    assert_eq!(
        outcome,
        StartOutcome::Failed {
            reason: "connection refused".into()
        }
    );
    assert_eq!(session.state().await, TaskState::Failed);
    assert!(session.current_task().await.is_none());

    let entries = session.transcript().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[1].content,
        "Sorry, I encountered an error: connection refused. Please make sure the backend servers are running."
    );

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(gateway.status_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn manual_handoff_never_polls_and_returns_to_idle() {
    let gateway = Arc::new(ScriptedGateway::new(AckScript::Manual, vec![]));
    let session = session(&gateway);

    let outcome = session.start("go").await;
    assert_eq!(
        outcome,
        StartOutcome::ManualRequired {
            task_id: "exec-m".into()
        }
    );
    assert_eq!(session.state().await, TaskState::Running);

    let entries = session.transcript().await;
    let explanation = &entries[1].content;
    assert!(explanation.contains("⚠️ Manual execution required:\nPlease run it in the web-ui"));
    assert!(explanation.contains("Steps to execute:\n1. Open the web-ui\n2. Click Start"));
    assert!(explanation.ends_with("🔗 Open web-ui: http://localhost:7788"));
    assert_eq!(
        session.backend_link().await.as_deref(),
        Some("http://localhost:7788")
    );

    assert_eq!(session.wait_until_settled().await, TaskState::Idle);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(gateway.status_count(), 0);
    assert_eq!(session.transcript().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_poll_result_after_stop_is_discarded() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(
        ScriptedGateway::new(
            AckScript::Processing,
            vec![StatusStep::Gated(gate.clone(), completed("too late"))],
        )
        .with_cancel(),
    );
    let session = session(&gateway);

    session.start("go").await;
    gateway.status_entered.notified().await;
    assert!(session.stop().await);
    gate.notify_one();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(session.state().await, TaskState::Stopped);
    let entries = session.transcript().await;
    assert!(entries.iter().all(|e| e.kind != EntryKind::Terminal));
    assert_eq!(gateway.status_count(), 1);
    assert_eq!(*gateway.cancels.lock().unwrap(), vec!["exec-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn stop_during_starting_discards_the_late_ack() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(
        ScriptedGateway::new(AckScript::Processing, vec![])
            .gated_submit(gate.clone())
            .with_cancel(),
    );
    let session = session(&gateway);

    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start("go").await })
    };
    gateway.submit_entered.notified().await;
    assert!(session.stop().await);
    gate.notify_one();

    assert_eq!(starter.await.unwrap(), StartOutcome::Superseded);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(session.state().await, TaskState::Stopped);
    assert_eq!(gateway.status_count(), 0);
    assert!(gateway.cancels.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_when_idle_reports_nothing_to_do() {
    let gateway = Arc::new(ScriptedGateway::new(AckScript::Processing, vec![]));
    let session = session(&gateway);
    assert!(!session.stop().await);
    assert_eq!(session.state().await, TaskState::Idle);
}

#[tokio::test(start_paused = true)]
async fn pause_is_local_and_task_can_finish_while_paused() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(ScriptedGateway::new(
        AckScript::Processing,
        vec![StatusStep::Gated(gate.clone(), completed("done"))],
    ));
    let session = session(&gateway);

    session.start("go").await;
    assert_eq!(session.toggle_pause().await, Some(TaskState::Paused));
    assert_eq!(session.toggle_pause().await, Some(TaskState::Running));
    assert_eq!(session.toggle_pause().await, Some(TaskState::Paused));

    gateway.status_entered.notified().await;
    gate.notify_one();
    assert_eq!(session.wait_until_settled().await, TaskState::Completed);
    assert_eq!(session.toggle_pause().await, None);
}

#[tokio::test(start_paused = true)]
async fn clear_is_idempotent_and_drops_screenshots() {
    let gateway = Arc::new(ScriptedGateway::new(
        AckScript::Processing,
        vec![StatusStep::Report(completed("done"))],
    ));
    let session = session(&gateway);
    session.start("go").await;
    session.wait_until_settled().await;
    assert_eq!(session.screenshots().await, vec!["final.png".to_string()]);

    session.clear().await;
    session.clear().await;
    assert!(session.transcript().await.is_empty());
    assert!(session.screenshots().await.is_empty());
    assert_eq!(session.state().await, TaskState::Completed);
}

#[tokio::test(start_paused = true)]
async fn browser_flag_change_is_broadcast() {
    let gateway = Arc::new(ScriptedGateway::new(AckScript::Processing, vec![]));
    let session = session(&gateway);
    let mut events = session.subscribe();

    session.set_field("headless", "true").await.unwrap();
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::BrowserTeardown(vec!["headless"])
    );

    session.set_field("windowWidth", "1024").await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn rejected_bundle_changes_nothing() {
    let gateway = Arc::new(ScriptedGateway::new(AckScript::Processing, vec![]));
    let session = session(&gateway);

    let mut bundle = session.export_bundle().await;
    bundle.agent_settings.max_steps = 5000;
    bundle.browser_settings.headless = true;
    let text = bundle.to_json().unwrap();

    assert!(session.import_bundle(&text).await.is_err());
    let (agent, browser) = session.settings_snapshot().await;
    assert_eq!(agent.max_steps, 100);
    assert!(!browser.headless);

    bundle.agent_settings.max_steps = 50;
    let update = session
        .import_bundle(&bundle.to_json().unwrap())
        .await
        .unwrap();
    assert!(update.teardown_requested);
    assert_eq!(session.settings_snapshot().await.0.max_steps, 50);
}
