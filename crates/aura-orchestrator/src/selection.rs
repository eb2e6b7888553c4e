//! Provider selection engine: a pure function from (requested tier,
//! offline policy, available providers) to an ordered fallback chain.
//! Deliberately free of `&self`/I/O so the precedence rules are trivial
//! to unit test in isolation.

use std::collections::HashSet;

use aura_providers::ProviderError;
use aura_types::{CapabilityManifest, ErrorCode, RequestedTier, Tier};

/// Outcome of a selection pass: the chain to try, in order, plus enough
/// metadata for the orchestrator to log the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRecord {
    pub chain: Vec<String>,
    pub primary: String,
    pub is_fallback: bool,
    pub fallback_from: Option<RequestedTier>,
    pub reason: String,
}

/// Runs the seven precedence rules over `available`, the set of
/// manifests already filtered down to the stage's provider category by the
/// caller (selection itself has no notion of category).
pub fn select_chain(
    requested_tier: RequestedTier,
    offline_only: bool,
    available: &[CapabilityManifest],
) -> Result<SelectionRecord, ProviderError> {
    if offline_only && requested_tier == RequestedTier::Pro {
        return Err(ProviderError::new(
            ErrorCode::OfflinePolicyViolation,
            "selection",
            "offline_only forbids a hard Pro requirement",
        )
        .with_retryable(false));
    }

    let (effective_tier, mut downgrade_reason) =
        if offline_only && requested_tier == RequestedTier::ProIfAvailable {
            (RequestedTier::Free, Some("offline".to_string()))
        } else {
            (requested_tier, None)
        };

    let mut candidates: Vec<&CapabilityManifest> = match effective_tier {
        RequestedTier::Pro | RequestedTier::ProIfAvailable => {
            let mut chain = Vec::new();
            chain.extend(available.iter().filter(|p| p.tier == Tier::Pro));
            chain.extend(available.iter().filter(|p| p.tier == Tier::Local));
            chain.extend(available.iter().filter(|p| p.tier == Tier::Free));
            chain
        }
        RequestedTier::Free => available
            .iter()
            .filter(|p| p.tier == Tier::Free)
            .chain(available.iter().filter(|p| p.tier == Tier::Local))
            .collect(),
    };

    if offline_only {
        candidates.retain(|p| !p.online_required);
    }

    let mut seen = HashSet::new();
    let chain: Vec<String> = candidates
        .into_iter()
        .map(|p| p.name.clone())
        .filter(|name| seen.insert(name.clone()))
        .collect();

    let Some(primary) = chain.first().cloned() else {
        return Err(ProviderError::new(
            ErrorCode::NoProviderAvailable,
            "selection",
            "no provider available for this stage under the effective tier/offline policy",
        )
        .with_retryable(false));
    };

    let primary_tier = available.iter().find(|p| p.name == primary).map(|p| p.tier);
    let wanted_tier = match requested_tier {
        RequestedTier::Pro | RequestedTier::ProIfAvailable => Tier::Pro,
        RequestedTier::Free => Tier::Free,
    };
    let is_fallback = downgrade_reason.is_some() || primary_tier != Some(wanted_tier);

    if !is_fallback {
        downgrade_reason = None;
    }
    let reason = downgrade_reason.clone().unwrap_or_else(|| {
        if is_fallback {
            format!(
                "requested tier {requested_tier:?} not available, primary provider '{primary}' is {primary_tier:?}"
            )
        } else {
            "primary satisfies the requested tier".to_string()
        }
    });

    Ok(SelectionRecord {
        chain,
        primary,
        is_fallback,
        fallback_from: is_fallback.then_some(requested_tier),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_types::ProviderCategory;

    fn manifest(name: &str, tier: Tier, online_required: bool) -> CapabilityManifest {
        CapabilityManifest {
            name: name.to_string(),
            category: ProviderCategory::Llm,
            tier,
            online_required,
            supports_streaming: false,
            supports_cancellation: true,
            soft_timeout: std::time::Duration::from_secs(30),
        }
    }

    #[test]
    fn offline_and_hard_pro_fails_fast() {
        let err = select_chain(RequestedTier::Pro, true, &[manifest("p", Tier::Pro, true)])
            .unwrap_err();
        assert_eq!(err.code(), "E307");
        assert!(!err.retryable);
    }

    #[test]
    fn offline_downgrades_pro_if_available_to_free() {
        let available = vec![
            manifest("pro-a", Tier::Pro, true),
            manifest("free-a", Tier::Free, false),
        ];
        let record = select_chain(RequestedTier::ProIfAvailable, true, &available).unwrap();
        assert_eq!(record.primary, "free-a");
        assert_eq!(record.reason, "offline");
        assert!(record.is_fallback);
        assert_eq!(record.fallback_from, Some(RequestedTier::ProIfAvailable));
    }

    #[test]
    fn pro_request_orders_pro_then_local_then_free() {
        let available = vec![
            manifest("free-a", Tier::Free, false),
            manifest("local-a", Tier::Local, false),
            manifest("pro-a", Tier::Pro, false),
        ];
        let record = select_chain(RequestedTier::Pro, false, &available).unwrap();
        assert_eq!(record.chain, vec!["pro-a", "local-a", "free-a"]);
        assert!(!record.is_fallback);
    }

    #[test]
    fn free_request_prefers_free_over_local_and_excludes_pro() {
        let available = vec![
            manifest("local-a", Tier::Local, false),
            manifest("pro-a", Tier::Pro, false),
            manifest("free-a", Tier::Free, false),
        ];
        let record = select_chain(RequestedTier::Free, false, &available).unwrap();
        assert_eq!(record.chain, vec!["free-a", "local-a"]);
    }

    #[test]
    fn online_required_providers_are_dropped_when_offline() {
        let available = vec![
            manifest("online-free", Tier::Free, true),
            manifest("offline-free", Tier::Free, false),
        ];
        let record = select_chain(RequestedTier::Free, true, &available).unwrap();
        assert_eq!(record.chain, vec!["offline-free"]);
    }

    #[test]
    fn empty_chain_fails_with_no_provider_available() {
        let err = select_chain(RequestedTier::Free, false, &[]).unwrap_err();
        assert_eq!(err.code(), "E305");
    }

    #[test]
    fn falling_back_from_pro_to_free_is_recorded() {
        let available = vec![manifest("free-a", Tier::Free, false)];
        let record = select_chain(RequestedTier::Pro, false, &available).unwrap();
        assert!(record.is_fallback);
        assert_eq!(record.fallback_from, Some(RequestedTier::Pro));
    }
}
