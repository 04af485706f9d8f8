#![allow(non_snake_case)]

mod common;

use common::{
    TestContext,
    wait_until_ready,
};
use rungs_client::{
    AdvanceResult,
    CashOutResult,
    ClientError,
    Difficulty,
    RoundEvent,
};

#[tokio::test(start_paused = true)]
async fn full_round__start_advance_cash_out_resets_and_draws_one_nonce_per_call() {
    // given
    let ctx = TestContext::new();
    let mut session = ctx.attach().await;
    let mut events = session.subscribe();

    // when: wager, wait for the provider, climb one rung, bank it
    let start = session.start_round(Difficulty::Easy, 2).await.unwrap();
    wait_until_ready(&session).await;
    let advance = session.advance().await.unwrap();
    let cash_out = session.cash_out().await.unwrap();

    // then
    assert!(matches!(
        advance.result,
        AdvanceResult::Advanced { stage: 1, .. }
    ));
    assert!(matches!(
        cash_out.result,
        CashOutResult::Secured { stage: 1, .. }
    ));
    assert!(!session.is_round_active());
    assert!(!ctx.ledger.has_active_round(ctx.account));

    // one nonce per submitted call, in order, no gaps
    assert_eq!(ctx.ledger.attempted_nonces(), vec![0, 1, 2]);
    assert_eq!(ctx.ledger.accepted_nonces(), vec![0, 1, 2]);
    assert_eq!(ctx.ledger.next_nonce_of(ctx.account), 3);

    // and the transitions went out in order
    assert_eq!(
        events.try_recv().unwrap(),
        RoundEvent::WagerAccepted {
            round_id: start.round_id.0,
            wager: 2,
            tier_index: Difficulty::Easy.as_index(),
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        RoundEvent::RandomnessReady {
            round_id: start.round_id.0,
        }
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        RoundEvent::AdvanceConfirmed { stage: 1, .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        RoundEvent::CashedOut { stage: 1, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn advance__ledger_reported_loss_ends_the_round_without_rearming() {
    // given a round whose first advance the ledger decides against
    let ctx = TestContext::new();
    ctx.ledger.script_advances([false]);
    let mut session = ctx.attach().await;
    let mut events = session.subscribe();
    session.start_round(Difficulty::Easy, 2).await.unwrap();
    wait_until_ready(&session).await;

    // when
    let outcome = session.advance().await.unwrap();

    // then: straight to the loss, machine freed, next wager permitted
    assert!(matches!(
        outcome.result,
        AdvanceResult::RoundOver { failed: true }
    ));
    assert!(!session.is_round_active());
    assert!(!session.is_randomness_ready());

    let mut saw_loss = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RoundEvent::RoundLost { .. }) {
            saw_loss = true;
        }
    }
    assert!(saw_loss);
    assert!(session.start_round(Difficulty::Easy, 2).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn advance__rejected_until_randomness_is_ready() {
    // given
    let ctx = TestContext::new();
    let mut session = ctx.attach().await;
    let start = session.start_round(Difficulty::Easy, 2).await.unwrap();
    ctx.ledger.delay_randomness(start.round_id, u32::MAX);

    // when
    let result = session.advance().await;

    // then
    assert!(matches!(result, Err(ClientError::NotReady)));
}

#[tokio::test(start_paused = true)]
async fn advance__inclusion_timeout_is_terminal_but_frees_the_guard() {
    // given a transport that loses receipts
    let ctx = TestContext::new();
    let mut session = ctx.attach().await;
    session.start_round(Difficulty::Easy, 2).await.unwrap();
    wait_until_ready(&session).await;
    ctx.ledger.drop_receipts(true);

    // when
    let timed_out = session.advance().await;

    // then the wait cap produced a distinct failure and the next attempt runs
    assert!(matches!(
        timed_out,
        Err(ClientError::InclusionTimeout { .. })
    ));
    assert!(session.is_round_active());
    ctx.ledger.drop_receipts(false);
    assert!(session.advance().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn advance__multiplier_follows_the_tier_schedule() {
    // given
    let ctx = TestContext::new();
    let mut session = ctx.attach().await;
    session.start_round(Difficulty::Hard, 10).await.unwrap();
    wait_until_ready(&session).await;

    // when
    let first = session.advance().await.unwrap();
    let second = session.advance().await.unwrap();

    // then
    let AdvanceResult::Advanced {
        multiplier_bps: m1, ..
    } = first.result
    else {
        panic!("expected an advance");
    };
    let AdvanceResult::Advanced {
        multiplier_bps: m2, ..
    } = second.result
    else {
        panic!("expected an advance");
    };
    assert_eq!(m1, Difficulty::Hard.multiplier_after_bps(1));
    assert_eq!(m2, Difficulty::Hard.multiplier_after_bps(2));
    assert!(m2 > m1);
}
