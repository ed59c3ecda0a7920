//! Integration tests for the token expiry scheduler.
//!
//! Uses paused tokio time: `sleep` resolves as soon as every task is idle,
//! so a 10 minute timer fires instantly while still observing ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use benevo_timer::{DelaySource, SchedulerConfig, TokenExpiryScheduler};
use benevo_types::{Role, Timestamp};

// =========================================================================
// Helpers
// =========================================================================

const NOW_SECS: u64 = 1_700_000_000;

fn now() -> Timestamp {
    Timestamp::from_secs(NOW_SECS)
}

fn token_expiring_in(secs: u64) -> String {
    let payload = format!(r#"{{"sub":"u-1","exp":{}}}"#, NOW_SECS + secs);
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload)
    )
}

fn scheduler() -> TokenExpiryScheduler {
    TokenExpiryScheduler::new(SchedulerConfig::default())
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// =========================================================================
// compute_delay / delay_for
// =========================================================================

#[test]
fn test_compute_delay_refreshes_five_minutes_before_expiry() {
    let s = scheduler();
    let delay = s.compute_delay(&token_expiring_in(3600), now());
    assert_eq!(delay, Some(Duration::from_secs(3600 - 300)));
}

#[test]
fn test_compute_delay_floors_at_one_minute() {
    let s = scheduler();
    // Expires in 2 minutes: 2m - 5m is negative, so the floor applies.
    let delay = s.compute_delay(&token_expiring_in(120), now());
    assert_eq!(delay, Some(Duration::from_secs(60)));
}

#[test]
fn test_compute_delay_already_expired_token_floors() {
    let s = scheduler();
    let later = now().saturating_add(Duration::from_secs(3600));
    let delay = s.compute_delay(&token_expiring_in(0), later);
    assert_eq!(delay, Some(Duration::from_secs(60)));
}

#[test]
fn test_compute_delay_garbage_token_is_none() {
    let s = scheduler();
    assert_eq!(s.compute_delay("garbage", now()), None);
}

#[test]
fn test_delay_for_garbage_token_admin_uses_ten_minutes() {
    let s = scheduler();
    let scheduled = s.delay_for("garbage", Some(Role::Admin), now());
    assert_eq!(scheduled.delay, Duration::from_secs(600));
    assert_eq!(scheduled.source, DelaySource::RoleDefault);
}

#[test]
fn test_delay_for_garbage_token_volunteer_uses_twenty_minutes() {
    let s = scheduler();
    let scheduled = s.delay_for("garbage", Some(Role::Volunteer), now());
    assert_eq!(scheduled.delay, Duration::from_secs(1200));
}

#[test]
fn test_delay_for_readable_token_uses_expiry() {
    let s = scheduler();
    let scheduled = s.delay_for(&token_expiring_in(1800), Some(Role::Admin), now());
    assert_eq!(scheduled.delay, Duration::from_secs(1500));
    assert_eq!(scheduled.source, DelaySource::TokenExpiry);
}

// =========================================================================
// arm / disarm
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_armed_timer_fires_after_delay() {
    let s = scheduler();
    let fired = counter();

    let c = Arc::clone(&fired);
    assert!(s.arm(Duration::from_secs(600), move || async move {
        c.fetch_add(1, Ordering::SeqCst);
    }));
    assert!(s.is_armed());
    assert_eq!(s.armed_delay(), Some(Duration::from_secs(600)));

    tokio::time::sleep(Duration::from_secs(599)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!s.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_rearm_cancels_previous_timer() {
    let s = scheduler();
    let fired = counter();

    let first = Arc::clone(&fired);
    s.arm(Duration::from_secs(60), move || async move {
        first.fetch_add(100, Ordering::SeqCst);
    });
    let second = Arc::clone(&fired);
    s.arm(Duration::from_secs(120), move || async move {
        second.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disarm_prevents_firing() {
    let s = scheduler();
    let fired = counter();
    let c = Arc::clone(&fired);
    s.arm(Duration::from_secs(60), move || async move {
        c.fetch_add(1, Ordering::SeqCst);
    });

    s.disarm();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!s.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_callback_can_rearm_without_cancelling_itself() {
    let s = Arc::new(scheduler());
    let fired = counter();

    let inner = Arc::clone(&s);
    let c = Arc::clone(&fired);
    s.arm(Duration::from_secs(60), move || async move {
        let c2 = Arc::clone(&c);
        inner.arm(Duration::from_secs(60), move || async move {
            c2.fetch_add(10, Ordering::SeqCst);
        });
        // Still running after re-arming: this line must execute.
        tokio::task::yield_now().await;
        c.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(s.is_armed());

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 11);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_scheduler_refuses_to_arm() {
    let s = scheduler();
    s.stop();

    let armed = s.arm(Duration::from_secs(60), || async {});

    assert!(!armed);
    assert!(!s.is_armed());
    assert!(s.is_stopped());

    s.start();
    assert!(s.arm(Duration::from_secs(60), || async {}));
}

#[tokio::test(start_paused = true)]
async fn test_stop_disarms_pending_timer() {
    let s = scheduler();
    let fired = counter();
    let c = Arc::clone(&fired);
    s.arm(Duration::from_secs(60), move || async move {
        c.fetch_add(1, Ordering::SeqCst);
    });

    s.stop();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let s = scheduler();
    s.arm(Duration::from_secs(600), || async {});

    tokio::time::sleep(Duration::from_secs(100)).await;

    assert_eq!(s.remaining(), Some(Duration::from_secs(500)));
}
