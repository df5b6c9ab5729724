//! Network-condition simulation.
//!
//! Computes a delay and an outcome for a matched rule, and provides a
//! cancellation-safe wait primitive. Outcome precedence is fixed:
//! `error_mode` wins over the random-failure draw, and no entropy is
//! consumed when `error_mode` is set.

use crate::config::{ErrorMode, GlobalConfig, Rule};
use crate::error::WaitError;
use crate::rng::draw_percent;
use rand::RngCore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of the simulation for one matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Proceed to response synthesis
    Proceed,
    /// Fail with a simulated timeout
    Timeout,
    /// Fail as if the network were offline
    Offline,
    /// Fail via the random-failure draw
    RandomFail,
}

/// Delay and outcome computed for one matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPlan {
    pub delay_ms: u64,
    pub outcome: Outcome,
}

/// Compute the plan for a matched rule.
///
/// Delay resolution, first defined wins: rule's explicit delay, rule's
/// named profile, global default profile, zero.
pub fn plan(rule: &Rule, global: &GlobalConfig, rng: &mut dyn RngCore) -> NetworkPlan {
    let network = &rule.network;

    let delay_ms = network
        .delay_ms
        .or_else(|| lookup_profile(global, network.profile.as_deref()))
        .or_else(|| lookup_profile(global, global.default_profile.as_deref()))
        .unwrap_or(0);

    let outcome = match network.error_mode {
        ErrorMode::Timeout => Outcome::Timeout,
        ErrorMode::Offline => Outcome::Offline,
        ErrorMode::None => {
            if network.fail_rate > 0 && draw_percent(rng, network.fail_rate) {
                Outcome::RandomFail
            } else {
                Outcome::Proceed
            }
        }
    };

    NetworkPlan { delay_ms, outcome }
}

fn lookup_profile(global: &GlobalConfig, name: Option<&str>) -> Option<u64> {
    name.and_then(|n| global.profiles.get(n).copied())
}

/// Sleep for `delay_ms`, racing caller cancellation.
///
/// An already-cancelled token rejects immediately without scheduling a
/// timer. Cancellation during the wait rejects promptly; the pending
/// sleep is dropped either way, so no timer or listener outlives the
/// call.
pub async fn wait(delay_ms: u64, cancel: &CancellationToken) -> Result<(), WaitError> {
    if cancel.is_cancelled() {
        return Err(WaitError::Cancelled);
    }
    if delay_ms == 0 {
        return Ok(());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WaitError::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpMethod, NetworkPolicy};
    use crate::rng::Mulberry32;
    use std::time::Instant;
    use tokio_test::assert_ok;

    fn rule_with_network(network: NetworkPolicy) -> Rule {
        Rule {
            id: "net".to_string(),
            name: None,
            url_pattern: "/api/net".to_string(),
            method: HttpMethod::Get,
            enabled: true,
            network,
            response: Default::default(),
            field_omit: Default::default(),
        }
    }

    #[test]
    fn test_delay_explicit_wins() {
        let rule = rule_with_network(NetworkPolicy {
            delay_ms: Some(50),
            profile: Some("slow".to_string()),
            ..Default::default()
        });
        let mut global = GlobalConfig::default();
        global.default_profile = Some("3g".to_string());
        let plan = plan(&rule, &global, &mut Mulberry32::new(0));
        assert_eq!(plan.delay_ms, 50);
    }

    #[test]
    fn test_delay_rule_profile_beats_global() {
        let rule = rule_with_network(NetworkPolicy {
            profile: Some("slow".to_string()),
            ..Default::default()
        });
        let mut global = GlobalConfig::default();
        global.default_profile = Some("fast".to_string());
        let plan = plan(&rule, &global, &mut Mulberry32::new(0));
        assert_eq!(plan.delay_ms, 2000);
    }

    #[test]
    fn test_delay_falls_back_to_global_then_zero() {
        let rule = rule_with_network(NetworkPolicy::default());
        let mut global = GlobalConfig::default();
        global.default_profile = Some("fast".to_string());
        assert_eq!(plan(&rule, &global, &mut Mulberry32::new(0)).delay_ms, 100);

        global.default_profile = None;
        assert_eq!(plan(&rule, &global, &mut Mulberry32::new(0)).delay_ms, 0);
    }

    #[test]
    fn test_unknown_profile_falls_through() {
        let rule = rule_with_network(NetworkPolicy {
            profile: Some("no-such-profile".to_string()),
            ..Default::default()
        });
        let mut global = GlobalConfig::default();
        global.default_profile = Some("fast".to_string());
        assert_eq!(plan(&rule, &global, &mut Mulberry32::new(0)).delay_ms, 100);
    }

    #[test]
    fn test_error_mode_beats_fail_rate() {
        let rule = rule_with_network(NetworkPolicy {
            error_mode: ErrorMode::Offline,
            fail_rate: 100,
            ..Default::default()
        });
        let global = GlobalConfig::default();
        for seed in 0..20 {
            let plan = plan(&rule, &global, &mut Mulberry32::new(seed));
            assert_eq!(plan.outcome, Outcome::Offline);
        }
    }

    #[test]
    fn test_error_mode_consumes_no_entropy() {
        let rule = rule_with_network(NetworkPolicy {
            error_mode: ErrorMode::Timeout,
            fail_rate: 100,
            ..Default::default()
        });
        let global = GlobalConfig::default();
        let mut rng = Mulberry32::new(42);
        let before: u32 = {
            let mut probe = rng.clone();
            probe.next_u32()
        };
        plan(&rule, &global, &mut rng);
        assert_eq!(rng.next_u32(), before);
    }

    #[test]
    fn test_fail_rate_extremes() {
        let global = GlobalConfig::default();

        let certain = rule_with_network(NetworkPolicy {
            fail_rate: 100,
            ..Default::default()
        });
        let never = rule_with_network(NetworkPolicy {
            fail_rate: 0,
            ..Default::default()
        });
        for seed in 0..20 {
            let mut rng = Mulberry32::new(seed);
            assert_eq!(plan(&certain, &global, &mut rng).outcome, Outcome::RandomFail);
            let mut rng = Mulberry32::new(seed);
            assert_eq!(plan(&never, &global, &mut rng).outcome, Outcome::Proceed);
        }
    }

    #[tokio::test]
    async fn test_wait_completes_naturally() {
        tokio::time::pause();
        let token = CancellationToken::new();
        tokio_test::assert_ok!(wait(5_000, &token).await);
    }

    #[tokio::test]
    async fn test_wait_rejects_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let start = Instant::now();
        let result = wait(60_000, &token).await;
        assert_eq!(result, Err(WaitError::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_wait_rejects_on_mid_wait_cancellation() {
        tokio::time::pause();
        let token = CancellationToken::new();
        let waiter = wait(60_000, &token);
        tokio::pin!(waiter);

        // Let the wait start, then cancel well before the delay elapses
        tokio::select! {
            _ = &mut waiter => panic!("wait finished before cancellation"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
        token.cancel();
        assert_eq!(waiter.await, Err(WaitError::Cancelled));
    }

    #[tokio::test]
    async fn test_wait_zero_delay_resolves_without_timer() {
        let token = CancellationToken::new();
        tokio_test::assert_ok!(wait(0, &token).await);
    }
}
