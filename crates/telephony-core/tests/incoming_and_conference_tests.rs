//! Incoming calls, conference aggregation and hold arbitration

mod common;

use pretty_assertions::assert_eq;

use telephony_core::hold_tracker::HoldableId;
use telephony_core::{
    CallState, Capabilities, ConnectionEvent, DisconnectCause, OrchestratorEvent, OutgoingCallRequest,
    PhoneId, RadioPathEvent, TelephonyError, VideoState,
};

use common::{EventRecorder, Harness};

#[tokio::test]
async fn test_incoming_call_is_answered() {
    let h = Harness::dual_sim();
    let radio = h.phone(0).incoming_radio();

    let conn = h
        .orchestrator
        .on_incoming_call(PhoneId(0), radio.clone())
        .expect("incoming call tracked");
    assert_eq!(conn.state(), CallState::Ringing);
    assert_eq!(h.orchestrator.connections().len(), 1);

    h.orchestrator
        .accept_incoming_call(conn.id(), VideoState::AudioOnly)
        .await
        .expect("answered");
    assert_eq!(radio.commands(), vec!["answer".to_string()]);

    radio.emit(RadioPathEvent::StateChanged(CallState::Active));
    assert_eq!(conn.state(), CallState::Active);

    let err = h
        .orchestrator
        .accept_incoming_call(conn.id(), VideoState::AudioOnly)
        .await
        .expect_err("already answered");
    assert!(matches!(
        err,
        TelephonyError::InvalidState {
            state: CallState::Active,
            ..
        }
    ));
}

#[tokio::test]
async fn test_incoming_call_is_rejected() {
    let h = Harness::dual_sim();
    let radio = h.phone(1).incoming_radio();
    let conn = h
        .orchestrator
        .on_incoming_call(PhoneId(1), radio.clone())
        .expect("incoming call tracked");

    h.orchestrator
        .reject_incoming_call(conn.id())
        .await
        .expect("rejected");

    assert_eq!(radio.commands(), vec!["reject".to_string()]);
    assert_eq!(
        conn.disconnect_info().map(|i| i.cause),
        Some(DisconnectCause::IncomingRejected)
    );
    assert!(h.orchestrator.connection(conn.id()).is_none());
    assert!(!radio.has_listener());
}

#[tokio::test]
async fn test_incoming_call_on_unknown_phone() {
    let h = Harness::dual_sim();
    let radio = h.phone(0).incoming_radio();

    let err = h
        .orchestrator
        .on_incoming_call(PhoneId(7), radio)
        .expect_err("no such phone");

    assert!(matches!(err, TelephonyError::PhoneNotFound(PhoneId(7))));
    assert!(h.orchestrator.connections().is_empty());
}

#[tokio::test]
async fn test_hold_needs_two_top_level_calls() {
    let h = Harness::dual_sim();
    h.registry.set_max_active_subscriptions(2);

    let first = h
        .orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("5551111"))
        .await
        .expect("first call placed");
    h.phone(0).last_radio().emit(RadioPathEvent::StateChanged(CallState::Active));
    assert_eq!(h.orchestrator.hold_tracker().top_level_count(), 1);
    assert!(first.capabilities().contains(Capabilities::SUPPORT_HOLD));
    assert!(!first.capabilities().contains(Capabilities::HOLD));

    let second = h
        .orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("5552222"))
        .await
        .expect("second call placed");
    h.phone(0).last_radio().emit(RadioPathEvent::StateChanged(CallState::Active));
    assert_eq!(h.orchestrator.hold_tracker().top_level_count(), 2);
    assert!(first.capabilities().contains(Capabilities::HOLD));
    assert!(second.capabilities().contains(Capabilities::HOLD));

    first.close();
    assert_eq!(h.orchestrator.hold_tracker().top_level_count(), 1);
    assert!(!h.orchestrator.hold_tracker().contains(HoldableId::Connection(first.id())));
    assert!(!second.capabilities().contains(Capabilities::HOLD));
    assert!(second.capabilities().contains(Capabilities::SUPPORT_HOLD));
}

#[tokio::test]
async fn test_listener_ends_on_current_capabilities_after_conference_forms() {
    let h = Harness::dual_sim();

    let conn = h
        .orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("5551111"))
        .await
        .expect("call placed");
    let radio = h.phone(0).last_radio();
    radio.emit(RadioPathEvent::MultipartyChanged(true));
    let recorder = EventRecorder::new();
    conn.add_listener(recorder.clone());

    radio.emit(RadioPathEvent::StateChanged(CallState::Active));

    assert!(conn.conference_id().is_some());
    assert!(conn.capabilities().contains(Capabilities::DISCONNECT_FROM_CONFERENCE));
    let last_caps = recorder.events().into_iter().rev().find_map(|e| match e {
        ConnectionEvent::CapabilitiesChanged(caps) => Some(caps),
        _ => None,
    });
    assert_eq!(last_caps, Some(conn.capabilities()));
    let last_props = recorder.events().into_iter().rev().find_map(|e| match e {
        ConnectionEvent::PropertiesChanged(props) => Some(props),
        _ => None,
    });
    if let Some(props) = last_props {
        assert_eq!(props, conn.properties());
    }
}

#[tokio::test]
async fn test_multiparty_leg_forms_conference() {
    let h = Harness::dual_sim();
    let mut events = h.orchestrator.subscribe();

    let host = h
        .orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("5551111"))
        .await
        .expect("host call placed");
    let host_radio = h.phone(0).last_radio();
    host_radio.emit(RadioPathEvent::StateChanged(CallState::Active));

    let other = h
        .orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("5552222"))
        .await
        .expect("second call placed");
    h.phone(0).last_radio().emit(RadioPathEvent::StateChanged(CallState::Active));
    let recorder = EventRecorder::new();
    host.add_listener(recorder.clone());

    host_radio.emit(RadioPathEvent::MultipartyChanged(true));

    let conferences = h.orchestrator.conferences();
    assert_eq!(conferences.len(), 1);
    let conference = conferences[0].clone();
    assert_eq!(conference.member_ids(), vec![host.id()]);
    assert_eq!(host.conference_id(), Some(conference.id()));
    assert_eq!(other.conference_id(), None);
    assert!(h.orchestrator.hold_tracker().contains(HoldableId::Conference(conference.id())));
    assert_eq!(h.orchestrator.hold_tracker().top_level_count(), 2);
    assert!(conference.is_holdable());
    assert_eq!(
        recorder.count(|e| matches!(e, ConnectionEvent::ConferenceChanged(Some(_)))),
        1
    );

    let mut created = false;
    while let Ok(event) = events.try_recv() {
        if event == OrchestratorEvent::ConferenceCreated(conference.id()) {
            created = true;
        }
    }
    assert!(created);

    // holding a member holds the whole conference
    h.orchestrator.hold(host.id()).await.expect("hold routed");
    assert_eq!(host_radio.commands(), vec!["hold".to_string()]);
    assert_eq!(conference.state(), CallState::Holding);

    host_radio.emit(RadioPathEvent::MultipartyChanged(false));
    assert!(h.orchestrator.conferences().is_empty());
    assert_eq!(host.conference_id(), None);
    assert!(!h.orchestrator.hold_tracker().contains(HoldableId::Conference(conference.id())));
    assert!(!conference.is_live());
}
