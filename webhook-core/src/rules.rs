//! RBAC policy-rule validation and coverage.
//!
//! Coverage reproduces the upstream apiserver semantics: candidate rules are
//! broken down into atomic subrules (one group and resource, or one
//! non-resource URL, keeping the verb set), and each atom must be covered by
//! a single rule on the owning side. `*` subsumes any value, an owner rule
//! without `resourceNames` covers every name, and non-resource URLs honour a
//! trailing `*` segment.

use std::fmt;

use k8s_openapi::api::rbac::v1::PolicyRule;
use thiserror::Error;

/// A policy rule failed shape validation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{path}: {reason}")]
pub struct RuleValidationError {
    /// JSON-ish path of the offending rule, e.g. `rules[2]`.
    pub path: String,
    /// What the rule is missing.
    pub reason: &'static str,
}

/// Validate a slice of policy rules the way the apiserver validates role
/// objects: every rule needs at least one verb, and either resources with
/// api groups or (only at cluster scope) non-resource URLs.
pub fn validate(rules: &[PolicyRule], namespaced: bool, path: &str) -> Result<(), RuleValidationError> {
    for (i, rule) in rules.iter().enumerate() {
        let at = |reason| RuleValidationError {
            path: format!("{path}[{i}]"),
            reason,
        };
        if rule.verbs.is_empty() {
            return Err(at("must have at least one verb"));
        }
        let resources = rule.resources.as_deref().unwrap_or_default();
        let api_groups = rule.api_groups.as_deref().unwrap_or_default();
        let non_resource_urls = rule.non_resource_urls.as_deref().unwrap_or_default();
        if namespaced && !non_resource_urls.is_empty() {
            return Err(at("namespaced rules cannot name nonResourceURLs"));
        }
        if non_resource_urls.is_empty() {
            if resources.is_empty() {
                return Err(at("must have at least one resource"));
            }
            if api_groups.is_empty() {
                return Err(at("must have at least one apiGroup"));
            }
        } else if !resources.is_empty() || !api_groups.is_empty() {
            return Err(at("rules cannot apply to both resources and nonResourceURLs"));
        }
    }
    Ok(())
}

/// The atomic subrules of a candidate set that no owning rule covers.
///
/// Kept as full `PolicyRule` values so callers can enumerate exactly what the
/// requester is missing.
#[derive(Debug, Default, PartialEq)]
pub struct UncoveredRules(pub Vec<PolicyRule>);

impl UncoveredRules {
    /// Whether every candidate atom was covered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UncoveredRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for rule in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(
                f,
                "{{verbs: {:?}, apiGroups: {:?}, resources: {:?}, resourceNames: {:?}, nonResourceURLs: {:?}}}",
                rule.verbs,
                rule.api_groups.as_deref().unwrap_or_default(),
                rule.resources.as_deref().unwrap_or_default(),
                rule.resource_names.as_deref().unwrap_or_default(),
                rule.non_resource_urls.as_deref().unwrap_or_default(),
            )?;
        }
        Ok(())
    }
}

/// Check that every rule in `candidates` is covered by `owner`.
///
/// On failure the error lists the uncovered atoms.
pub fn coverage_check(owner: &[PolicyRule], candidates: &[PolicyRule]) -> Result<(), UncoveredRules> {
    let mut uncovered = Vec::new();
    for candidate in candidates {
        for atom in breakdown(candidate) {
            if !owner.iter().any(|rule| covers(rule, &atom)) {
                uncovered.push(atom);
            }
        }
    }
    if uncovered.is_empty() {
        Ok(())
    } else {
        Err(UncoveredRules(uncovered))
    }
}

/// Convenience single-rule variant of [`coverage_check`].
pub fn covers_rule(owner: &[PolicyRule], candidate: &PolicyRule) -> bool {
    coverage_check(owner, std::slice::from_ref(candidate)).is_ok()
}

/// Break a rule into atoms of a single group and resource (or a single
/// non-resource URL), keeping the verb and name sets intact.
fn breakdown(rule: &PolicyRule) -> Vec<PolicyRule> {
    let mut atoms = Vec::new();
    for group in rule.api_groups.as_deref().unwrap_or_default() {
        for resource in rule.resources.as_deref().unwrap_or_default() {
            atoms.push(PolicyRule {
                verbs: rule.verbs.clone(),
                api_groups: Some(vec![group.clone()]),
                resources: Some(vec![resource.clone()]),
                resource_names: rule.resource_names.clone(),
                non_resource_urls: None,
            });
        }
    }
    for url in rule.non_resource_urls.as_deref().unwrap_or_default() {
        atoms.push(PolicyRule {
            verbs: rule.verbs.clone(),
            api_groups: None,
            resources: None,
            resource_names: None,
            non_resource_urls: Some(vec![url.clone()]),
        });
    }
    atoms
}

fn has(set: &[String], target: &str) -> bool {
    set.iter().any(|v| v == target)
}

fn has_all(set: &[String], targets: &[String]) -> bool {
    targets.iter().all(|t| has(set, t))
}

/// Whether a single owning rule covers a candidate atom.
fn covers(owner: &PolicyRule, atom: &PolicyRule) -> bool {
    let verbs = has(&owner.verbs, "*") || has_all(&owner.verbs, &atom.verbs);

    let owner_groups = owner.api_groups.as_deref().unwrap_or_default();
    let atom_groups = atom.api_groups.as_deref().unwrap_or_default();
    let groups = has(owner_groups, "*") || has_all(owner_groups, atom_groups);

    let resources = resources_cover(
        owner.resources.as_deref().unwrap_or_default(),
        atom.resources.as_deref().unwrap_or_default(),
    );

    let urls = urls_cover(
        owner.non_resource_urls.as_deref().unwrap_or_default(),
        atom.non_resource_urls.as_deref().unwrap_or_default(),
    );

    let owner_names = owner.resource_names.as_deref().unwrap_or_default();
    let atom_names = atom.resource_names.as_deref().unwrap_or_default();
    let names = if atom_names.is_empty() {
        // requesting all names is only covered by a rule unrestricted by name
        owner_names.is_empty()
    } else {
        owner_names.is_empty() || has_all(owner_names, atom_names)
    };

    verbs && groups && resources && urls && names
}

fn resources_cover(owner: &[String], atoms: &[String]) -> bool {
    if has(owner, "*") || has_all(owner, atoms) {
        return true;
    }
    // `foo/*` covers any subresource of foo
    atoms.iter().all(|atom| {
        has(owner, atom)
            || atom
                .split_once('/')
                .is_some_and(|(parent, _)| has(owner, &format!("{parent}/*")))
    })
}

fn urls_cover(owner: &[String], atoms: &[String]) -> bool {
    atoms.iter().all(|atom| {
        owner.iter().any(|o| {
            o == atom || (o.ends_with('*') && atom.starts_with(o.trim_end_matches('*')))
        })
    })
}
