#![allow(non_snake_case)]

mod common;

use common::TestContext;
use rungs_client::{
    ClientError,
    Difficulty,
    RecoveryChoice,
    RoundEvent,
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn attach__resume_adopts_the_discovered_round() {
    // given a restarted client: no local round, ledger says stage 3
    let ctx = TestContext::with_choices([RecoveryChoice::Resume]);
    let round = ctx
        .ledger
        .seed_active_round(ctx.account, Difficulty::Hard, 5, 3, true, 10);

    // when
    let session = ctx.attach().await;

    // then the round is live again exactly where the ledger says it is
    assert!(session.is_round_active());
    assert_eq!(session.round_id(), Some(round));
    assert_eq!(session.current_stage(), 3);
    assert!(session.is_randomness_ready());

    let offers = ctx.prompt.offers_seen();
    assert_eq!(offers.len(), 1);
    assert!(offers[0].can_resume);
    assert_eq!(offers[0].elapsed, 10);
}

#[tokio::test(start_paused = true)]
async fn attach__resumed_round_can_keep_climbing() {
    // given
    let ctx = TestContext::with_choices([RecoveryChoice::Resume]);
    ctx.ledger
        .seed_active_round(ctx.account, Difficulty::Hard, 5, 3, true, 10);
    let mut session = ctx.attach().await;

    // when
    let outcome = session.advance().await.unwrap();

    // then
    assert!(matches!(
        outcome.result,
        rungs_client::AdvanceResult::Advanced { stage: 4, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn attach__ending_a_fresh_progressed_round_secures_it_never_times_it_out() {
    // given stage 3, only 10 ledger-seconds old
    let ctx = TestContext::with_choices([RecoveryChoice::EndRound]);
    ctx.ledger
        .seed_active_round(ctx.account, Difficulty::Hard, 5, 3, true, 10);

    // when
    let session = ctx.attach().await;

    // then the stage-preserving termination was chosen
    assert_eq!(ctx.ledger.terminations(), vec!["secure_round"]);
    assert!(!session.is_round_active());
    assert!(!ctx.ledger.has_active_round(ctx.account));
}

#[tokio::test(start_paused = true)]
async fn attach__ending_an_unprogressed_round_refunds_it() {
    // given
    let ctx = TestContext::with_choices([RecoveryChoice::EndRound]);
    ctx.ledger
        .seed_active_round(ctx.account, Difficulty::Easy, 2, 0, false, 10);

    // when
    let _session = ctx.attach().await;

    // then
    assert_eq!(ctx.ledger.terminations(), vec!["refund_round"]);
}

#[tokio::test(start_paused = true)]
async fn attach__ending_past_the_window_uses_the_timeout_termination() {
    // given a round idle for longer than the ledger's window
    let ctx = TestContext::with_choices([RecoveryChoice::EndRound]);
    ctx.ledger
        .seed_active_round(ctx.account, Difficulty::Easy, 2, 4, true, 400);

    // when
    let _session = ctx.attach().await;

    // then
    assert_eq!(ctx.ledger.terminations(), vec!["timeout_round"]);
    let offers = ctx.prompt.offers_seen();
    assert!(!offers[0].can_resume);
}

#[tokio::test(start_paused = true)]
async fn inactivity__blocks_game_actions_until_recovery_is_run() {
    // given a round left alone past the inactivity window
    let ctx = TestContext::with_choices([RecoveryChoice::EndRound]);
    let mut session = ctx.attach().await;
    let mut events = session.subscribe();
    session.start_round(Difficulty::Easy, 2).await.unwrap();
    tokio::time::sleep(Duration::from_secs(301)).await;

    // when
    let blocked = session.advance().await;

    // then the proactive timer latched the session shut
    assert!(matches!(blocked, Err(ClientError::RecoveryPending)));
    let mut detected = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RoundEvent::InactivityDetected { .. }) {
            detected = true;
        }
    }
    assert!(detected);

    // and running recovery ends the round with the ledger-time selection
    ctx.ledger.advance_time(400);
    let choice = session.run_recovery().await.unwrap();
    assert_eq!(choice, Some(RecoveryChoice::EndRound));
    assert_eq!(ctx.ledger.terminations(), vec!["timeout_round"]);
    assert!(!session.is_round_active());

    let offers = ctx.prompt.offers_seen();
    assert_eq!(offers.len(), 1);
    assert!(matches!(
        offers[0].reason,
        rungs_client::recovery::RecoveryReason::InactivityTimeout
    ));
}

#[tokio::test(start_paused = true)]
async fn inactivity__timer_is_cancelled_once_the_round_ends() {
    // given a full round finishing well inside the window
    let ctx = TestContext::new();
    let mut session = ctx.attach().await;
    session.start_round(Difficulty::Easy, 2).await.unwrap();
    common::wait_until_ready(&session).await;
    session.advance().await.unwrap();
    session.cash_out().await.unwrap();

    // when the window would have fired
    tokio::time::sleep(Duration::from_secs(400)).await;

    // then nothing latched and a new round starts cleanly
    assert!(session.start_round(Difficulty::Easy, 2).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn run_recovery__without_any_round_reports_nothing_to_do() {
    // given
    let ctx = TestContext::new();
    let mut session = ctx.attach().await;

    // when
    let choice = session.run_recovery().await.unwrap();

    // then
    assert_eq!(choice, None);
    assert!(ctx.prompt.offers_seen().is_empty());
}
