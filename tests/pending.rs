use broadcaster::{
    config::Broadcast,
    error::BroadcastError,
    job::Recipient,
    session::PendingBroadcasts,
};

fn targets() -> Vec<Recipient> {
    vec![Recipient::new("1"), Recipient::new("2").with_display_name("Two")]
}

#[test]
fn stage_select_confirm() {
    let pending = PendingBroadcasts::new(&Broadcast::default());
    let preview = pending.stage("admin", "server restart at noon").expect("stage");
    assert_eq!(preview, "server restart at noon");
    assert_eq!(pending.select_targets("admin", targets()).expect("select"), 2);

    let request = pending.confirm("admin").expect("confirm");
    assert_eq!(request.message, "server restart at noon");
    assert_eq!(request.recipients.len(), 2);
    assert!(!pending.is_pending("admin"));
}

#[test]
fn confirm_without_stage_fails() {
    let pending = PendingBroadcasts::new(&Broadcast::default());
    assert_eq!(
        pending.confirm("admin").unwrap_err(),
        BroadcastError::NoPendingRequest("admin".into())
    );
    assert!(pending.select_targets("admin", targets()).is_err());
}

#[test]
fn confirm_without_targets_keeps_request() {
    let pending = PendingBroadcasts::new(&Broadcast::default());
    pending.stage("admin", "hello").expect("stage");
    assert_eq!(
        pending.confirm("admin").unwrap_err(),
        BroadcastError::NoRecipientsSelected("admin".into())
    );
    assert!(pending.is_pending("admin"));
}

#[test]
fn cancel_drops_request() {
    let pending = PendingBroadcasts::new(&Broadcast::default());
    pending.stage("admin", "hello").expect("stage");
    assert!(pending.cancel("admin"));
    assert!(!pending.cancel("admin"));
    assert!(!pending.is_pending("admin"));
}

#[test]
fn invalid_messages_are_not_staged() {
    let cfg = Broadcast {
        max_message_len: 10,
        ..Broadcast::default()
    };
    let pending = PendingBroadcasts::new(&cfg);
    assert_eq!(
        pending.stage("admin", "").unwrap_err(),
        BroadcastError::EmptyMessage
    );
    assert_eq!(
        pending.stage("admin", "this is far too long").unwrap_err(),
        BroadcastError::MessageTooLong { len: 20, max: 10 }
    );
    assert!(!pending.is_pending("admin"));
}

#[test]
fn long_preview_is_shortened() {
    let cfg = Broadcast {
        preview_len: 5,
        ..Broadcast::default()
    };
    let pending = PendingBroadcasts::new(&cfg);
    let preview = pending.stage("admin", "abcdefghij").expect("stage");
    assert_eq!(preview, "abcde...");
}
