//! Suggesting recovery policies.
//!
//! A policy is a set of authentication methods, each escrowed at one
//! provider; solving every challenge of any single policy recovers the
//! secret. Suggestions pick method subsets of a fixed size and, for each
//! subset, the provider assignment that spreads the methods over the most
//! distinct providers while duplicating a method at as few providers as
//! possible across all policies chosen so far.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{AuthMethod, ProviderInfo};
use crate::error::RecoveryError;

/// Upper bound on method subsets considered.
pub const MAX_METHOD_SELECTIONS: usize = 200;
/// Upper bound on provider assignments evaluated per subset.
pub const MAX_POLICY_EVALUATIONS: usize = 10_000;

/// One method of a policy and the provider escrowing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyMethod {
    /// Index into the method list the policy was built from.
    pub authentication_method: usize,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub methods: Vec<PolicyMethod>,
}

/// Result of [`suggest_policies`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySelection {
    pub policies: Vec<Policy>,
    /// Every provider considered, in input order. The recovery document is
    /// stored at each of them.
    pub policy_providers: Vec<String>,
}

/// Number of methods per policy for `n` available methods.
pub fn methods_per_policy(n: usize) -> usize {
    match n {
        0..=2 => n,
        3..=4 => n - 1,
        5..=6 => n - 2,
        _ => 4,
    }
}

/// Suggest policies over `methods` and `providers`.
///
/// # Errors
///
/// [`RecoveryError::NoMethods`] for an empty method list and
/// [`RecoveryError::PolicyUnsatisfiable`] when no method subset can be
/// placed at providers that support every method in it.
pub fn suggest_policies(methods: &[AuthMethod], providers: &[ProviderInfo]) -> Result<PolicySelection, RecoveryError> {
    if methods.is_empty() {
        return Err(RecoveryError::NoMethods);
    }
    let size = methods_per_policy(methods.len());
    let selections = method_selections(size, methods.len(), MAX_METHOD_SELECTIONS);
    debug!(methods = methods.len(), providers = providers.len(), size, selections = selections.len(), "suggesting policies");

    let mut policies: Vec<Policy> = Vec::new();
    for selection in &selections {
        if let Some(policy) = assign_providers(&policies, methods, providers, selection) {
            policies.push(policy);
        }
    }
    if policies.is_empty() {
        return Err(RecoveryError::PolicyUnsatisfiable);
    }
    info!(policies = policies.len(), "policies suggested");
    Ok(PolicySelection { policies, policy_providers: providers.iter().map(|p| p.url.clone()).collect() })
}

/// Best provider assignment for one method subset, or `None` when every
/// assignment uses a provider lacking one of the methods.
fn assign_providers(
    existing: &[Policy],
    methods: &[AuthMethod],
    providers: &[ProviderInfo],
    selection: &[usize],
) -> Option<Policy> {
    // providers each method is already escrowed at
    let mut placed: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); methods.len()];
    for policy in existing {
        for m in &policy.methods {
            placed[m.authentication_method].insert(m.provider.as_str());
        }
    }
    let base: usize = placed.iter().map(BTreeSet::len).sum();

    let mut best: Option<(Vec<usize>, usize, usize)> = None;
    for mapping in ProviderMappings::new(selection.len(), providers.len()).take(MAX_POLICY_EVALUATIONS) {
        let possible = mapping
            .iter()
            .zip(selection)
            .all(|(&p, &m)| providers[p].supports(methods[m].method_type));
        if !possible {
            continue;
        }
        let diversity = mapping.iter().map(|&p| providers[p].url.as_str()).collect::<BTreeSet<_>>().len();
        // selected methods are distinct, so each new (method, provider) pair counts once
        let duplication = base
            + mapping
                .iter()
                .zip(selection)
                .filter(|&(&p, &m)| !placed[m].contains(providers[p].url.as_str()))
                .count();
        let better = match &best {
            None => true,
            Some((_, d, dup)) => diversity > *d || (diversity == *d && duplication < *dup),
        };
        if better {
            best = Some((mapping, diversity, duplication));
        }
    }

    best.map(|(mapping, _, _)| Policy {
        methods: mapping
            .into_iter()
            .zip(selection)
            .map(|(p, &m)| PolicyMethod { authentication_method: m, provider: providers[p].url.clone() })
            .collect(),
    })
}

/// All `n`-combinations of `0..m` without repetition, in lexicographic
/// order, truncated to `limit`.
fn method_selections(n: usize, m: usize, limit: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if n > m {
        return out;
    }
    let mut current: Vec<usize> = (0..n).collect();
    loop {
        if out.len() >= limit {
            break;
        }
        out.push(current.clone());
        // rightmost position that can still advance
        let Some(i) = (0..n).rev().find(|&i| current[i] < m - n + i) else {
            break;
        };
        current[i] += 1;
        for j in i + 1..n {
            current[j] = current[j - 1] + 1;
        }
    }
    out
}

/// All assignments of `n` slots to `m` providers (with repetition), in
/// lexicographic order.
struct ProviderMappings {
    current: Option<Vec<usize>>,
    m: usize,
}

impl ProviderMappings {
    fn new(n: usize, m: usize) -> Self {
        let current = (m > 0 || n == 0).then(|| vec![0; n]);
        Self { current, m }
    }
}

impl Iterator for ProviderMappings {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let item = self.current.take()?;
        let mut next = item.clone();
        let mut carried = true;
        for slot in next.iter_mut().rev() {
            *slot += 1;
            if *slot < self.m {
                carried = false;
                break;
            }
            *slot = 0;
        }
        if !carried {
            self.current = Some(next);
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethodType;

    fn method(t: AuthMethodType, tag: &str) -> AuthMethod {
        AuthMethod::new(t, tag, tag.as_bytes())
    }

    fn provider(url: &str, types: &[AuthMethodType]) -> ProviderInfo {
        types.iter().fold(ProviderInfo::new(url, url.as_bytes()), |p, t| {
            p.with_method(*t, "KUDOS:0".parse().unwrap())
        })
    }

    fn questions(n: usize) -> Vec<AuthMethod> {
        (0..n).map(|i| method(AuthMethodType::Question, &format!("q{i}"))).collect()
    }

    #[test]
    fn policy_size_table() {
        let sizes: Vec<usize> = (1..=9).map(methods_per_policy).collect();
        assert_eq!(sizes, vec![1, 2, 2, 3, 3, 4, 4, 4, 4]);
    }

    #[test]
    fn combinations_are_lexicographic() {
        assert_eq!(
            method_selections(2, 4, 100),
            vec![vec![0, 1], vec![0, 2], vec![0, 3], vec![1, 2], vec![1, 3], vec![2, 3]]
        );
        assert_eq!(method_selections(2, 4, 3).len(), 3);
        assert_eq!(method_selections(0, 3, 10), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn mappings_enumerate_full_product() {
        let all: Vec<_> = ProviderMappings::new(2, 3).collect();
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[8], vec![2, 2]);
        assert_eq!(ProviderMappings::new(2, 0).count(), 0);
    }

    #[test]
    fn no_methods_is_an_error() {
        let providers = [provider("https://p1/", &AuthMethodType::ALL)];
        assert_eq!(suggest_policies(&[], &providers), Err(RecoveryError::NoMethods));
    }

    #[test]
    fn unsupported_methods_are_unsatisfiable() {
        let methods = [method(AuthMethodType::Iban, "iban")];
        let providers = [provider("https://p1/", &[AuthMethodType::Sms])];
        assert_eq!(suggest_policies(&methods, &providers), Err(RecoveryError::PolicyUnsatisfiable));
        assert_eq!(suggest_policies(&methods, &[]), Err(RecoveryError::PolicyUnsatisfiable));
    }

    #[test]
    fn three_questions_two_providers() {
        let providers = [
            provider("https://p1/", &[AuthMethodType::Question]),
            provider("https://p2/", &[AuthMethodType::Question]),
        ];
        let sel = suggest_policies(&questions(3), &providers).unwrap();
        // C(3, 2) subsets, all satisfiable
        assert_eq!(sel.policies.len(), 3);
        assert_eq!(sel.policy_providers, vec!["https://p1/", "https://p2/"]);
        for p in &sel.policies {
            assert_eq!(p.methods.len(), 2);
            // both providers used
            assert_ne!(p.methods[0].provider, p.methods[1].provider);
        }
    }

    #[test]
    fn duplication_breaks_diversity_ties() {
        let providers = [
            provider("https://p1/", &[AuthMethodType::Question]),
            provider("https://p2/", &[AuthMethodType::Question]),
        ];
        let sel = suggest_policies(&questions(3), &providers).unwrap();
        // first policy {0 -> p1, 1 -> p2}; the second {0, 2} keeps method 0 at p1
        assert_eq!(sel.policies[0].methods[0], PolicyMethod { authentication_method: 0, provider: "https://p1/".into() });
        assert_eq!(sel.policies[0].methods[1], PolicyMethod { authentication_method: 1, provider: "https://p2/".into() });
        assert_eq!(sel.policies[1].methods[0].provider, "https://p1/");
        assert_eq!(sel.policies[1].methods[1].provider, "https://p2/");
    }

    #[test]
    fn methods_only_go_to_supporting_providers() {
        let methods = [method(AuthMethodType::Sms, "sms"), method(AuthMethodType::Email, "email")];
        let providers = [
            provider("https://sms-only/", &[AuthMethodType::Sms]),
            provider("https://email-only/", &[AuthMethodType::Email]),
        ];
        let sel = suggest_policies(&methods, &providers).unwrap();
        assert_eq!(sel.policies.len(), 1);
        assert_eq!(sel.policies[0].methods[0].provider, "https://sms-only/");
        assert_eq!(sel.policies[0].methods[1].provider, "https://email-only/");
    }

    #[test]
    fn count_is_invariant_under_reordering() {
        let methods = vec![
            method(AuthMethodType::Question, "q"),
            method(AuthMethodType::Sms, "sms"),
            method(AuthMethodType::Email, "email"),
            method(AuthMethodType::Totp, "totp"),
        ];
        let providers = vec![
            provider("https://a/", &[AuthMethodType::Question, AuthMethodType::Sms]),
            provider("https://b/", &[AuthMethodType::Email]),
            provider("https://c/", &[AuthMethodType::Question, AuthMethodType::Totp]),
        ];
        let count = |m: &[AuthMethod], p: &[ProviderInfo]| suggest_policies(m, p).map(|s| s.policies.len());
        let base = count(&methods, &providers).unwrap();
        let mut rm = methods.clone();
        rm.reverse();
        let mut rp = providers.clone();
        rp.reverse();
        assert_eq!(count(&rm, &providers).unwrap(), base);
        assert_eq!(count(&methods, &rp).unwrap(), base);
        assert_eq!(count(&rm, &rp).unwrap(), base);
    }

    #[test]
    fn eight_methods_use_four_per_policy() {
        let providers = [provider("https://p1/", &[AuthMethodType::Question])];
        let sel = suggest_policies(&questions(8), &providers).unwrap();
        // C(8, 4) = 70 subsets, below the selection limit
        assert_eq!(sel.policies.len(), 70);
        assert!(sel.policies.iter().all(|p| p.methods.len() == 4));
    }
}
