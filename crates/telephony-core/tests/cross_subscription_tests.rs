//! Calls on other subscriptions while placing or answering a call

mod common;

use pretty_assertions::assert_eq;

use telephony_core::config::CarrierConfig;
use telephony_core::{
    CallState, DisconnectCause, OutgoingCallRequest, PhoneId, RadioPathEvent, VideoState,
};

use common::{FakePhone, Harness, HarnessBuilder, Journal};

/// Place a call on `phone` and bring it to ACTIVE
async fn active_call_on(h: &Harness, phone: usize, number: &str) -> std::sync::Arc<telephony_core::Connection> {
    let conn = h
        .orchestrator
        .place_outgoing_call(OutgoingCallRequest::new(number).with_phone(PhoneId(phone)))
        .await
        .expect("call placed");
    h.phone(phone)
        .last_radio()
        .emit(RadioPathEvent::StateChanged(CallState::Active));
    assert_eq!(conn.state(), CallState::Active);
    conn
}

fn dual_sim_with(carrier: CarrierConfig, max_active: usize) -> Harness {
    let journal = Journal::default();
    let h = HarnessBuilder::new(journal.clone())
        .phone(FakePhone::new(0, &journal).build())
        .phone(FakePhone::new(1, &journal).build())
        .carrier(carrier)
        .build();
    h.registry.set_max_active_subscriptions(max_active);
    h
}

#[tokio::test]
async fn test_single_active_subscription_hangs_up_other_call_before_dial() {
    let h = Harness::dual_sim();
    let other = active_call_on(&h, 1, "5551111").await;

    h.orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("5552222").with_phone(PhoneId(0)))
        .await
        .expect("call placed");

    assert_eq!(other.state(), CallState::Disconnected);
    assert_eq!(other.disconnect_info().map(|i| i.cause), Some(DisconnectCause::Local));
    let hangup = h.journal.position("hangup:out1.0").expect("hangup recorded");
    let dial = h.journal.position("dial:0:5552222").expect("dial recorded");
    assert!(hangup < dial);
    assert_eq!(h.orchestrator.connections().len(), 1);
}

#[tokio::test]
async fn test_concurrent_subscriptions_leave_other_call_alone() {
    let h = dual_sim_with(CarrierConfig::default(), 2);
    let other = active_call_on(&h, 1, "5551111").await;

    h.orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("5552222").with_phone(PhoneId(0)))
        .await
        .expect("call placed");

    assert_eq!(other.state(), CallState::Active);
    assert!(h.phone(1).last_radio().commands().is_empty());
    assert_eq!(h.orchestrator.connections().len(), 2);
}

#[tokio::test]
async fn test_emergency_holds_other_subscription_when_required() {
    let carrier = CarrierConfig {
        allow_hold_call_during_emergency: false,
        ..CarrierConfig::default()
    };
    let h = dual_sim_with(carrier, 2);
    let other = active_call_on(&h, 1, "5551111").await;

    let emergency = h
        .orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("911"))
        .await
        .expect("emergency call placed");

    assert_eq!(emergency.phone_id(), PhoneId(0));
    assert_eq!(other.state(), CallState::Holding);
    assert_eq!(h.phone(1).last_radio().commands(), vec!["hold".to_string()]);
    let hold = h.journal.position("hold:out1.0").expect("hold recorded");
    let dial = h.journal.position("dial:0:911").expect("dial recorded");
    assert!(hold < dial);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_hold_falls_back_to_hangup() {
    let carrier = CarrierConfig {
        allow_hold_call_during_emergency: false,
        ..CarrierConfig::default()
    };
    let h = dual_sim_with(carrier, 2);
    let other = active_call_on(&h, 1, "5551111").await;
    h.phone(1).last_radio().set_confirm_hold(false);

    h.orchestrator
        .place_outgoing_call(OutgoingCallRequest::new("911"))
        .await
        .expect("emergency call placed");

    assert_eq!(other.disconnect_info().map(|i| i.cause), Some(DisconnectCause::Local));
    assert_eq!(
        h.phone(1).last_radio().commands(),
        vec!["hold".to_string(), "hangup".to_string()]
    );
    assert_eq!(h.phone(0).dialed_numbers(), vec!["911".to_string()]);
}

#[tokio::test]
async fn test_answer_on_single_active_subscription_hangs_up_other() {
    let h = Harness::dual_sim();
    let other = active_call_on(&h, 0, "5551111").await;

    let radio = h.phone(1).incoming_radio();
    let incoming = h
        .orchestrator
        .on_incoming_call(PhoneId(1), radio.clone())
        .expect("incoming call tracked");

    h.orchestrator
        .accept_incoming_call(incoming.id(), VideoState::AudioOnly)
        .await
        .expect("answered");

    assert_eq!(other.disconnect_info().map(|i| i.cause), Some(DisconnectCause::Local));
    assert_eq!(radio.commands(), vec!["answer".to_string()]);
    let hangup = h.journal.position("hangup:out0.0").expect("hangup recorded");
    let answer = h.journal.position("answer:in1.0").expect("answer recorded");
    assert!(hangup < answer);
}

#[tokio::test]
async fn test_answer_on_concurrent_subscriptions_holds_other() {
    let h = dual_sim_with(CarrierConfig::default(), 2);
    let other = active_call_on(&h, 0, "5551111").await;

    let radio = h.phone(1).incoming_radio();
    let incoming = h
        .orchestrator
        .on_incoming_call(PhoneId(1), radio.clone())
        .expect("incoming call tracked");

    h.orchestrator
        .accept_incoming_call(incoming.id(), VideoState::AudioOnly)
        .await
        .expect("answered");

    assert_eq!(other.state(), CallState::Holding);
    assert_eq!(radio.commands(), vec!["answer".to_string()]);
}
