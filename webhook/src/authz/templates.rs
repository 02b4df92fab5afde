//! The role-template inheritance graph.
//!
//! Templates reference each other by name through `roleTemplateNames`; the
//! closure of those references yields the effective rules of a template.
//! Cycles are possible at rest, so every walk is bounded by a visited set.

use std::collections::BTreeSet;
use std::sync::Arc;

use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use thiserror::Error;

use crate::stores::Store;
use crate::types::management::{GlobalRole, RoleTemplate};

/// Template context constants.
pub mod context {
    /// Templates bindable per cluster.
    pub const CLUSTER: &str = "cluster";
    /// Templates bindable per project.
    pub const PROJECT: &str = "project";
}

/// Errors from walking the template graph.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A referenced template is not in the cache.
    #[error("roleTemplate {0:?} was not found")]
    NotFound(String),

    /// The graph revisited a template while expanding it.
    #[error("roleTemplate {root:?} has a circular reference: {found:?} is inherited more than once")]
    CircularReference {
        /// The template the walk started from.
        root: String,
        /// The template seen twice.
        found: String,
    },
}

/// Resolves role templates and their inherited rules through the cache.
#[derive(Clone)]
pub struct RoleTemplateResolver {
    role_templates: Arc<dyn Store<RoleTemplate>>,
    cluster_roles: Arc<dyn Store<ClusterRole>>,
}

impl RoleTemplateResolver {
    /// Create a resolver over the template and cluster-role caches.
    pub fn new(
        role_templates: Arc<dyn Store<RoleTemplate>>,
        cluster_roles: Arc<dyn Store<ClusterRole>>,
    ) -> Self {
        Self {
            role_templates,
            cluster_roles,
        }
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Result<Arc<RoleTemplate>, TemplateError> {
        self.role_templates
            .get(None, name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    /// Every template reachable from `root` (excluding root) in walk order.
    ///
    /// A revisit of any template is reported as a circular reference; walk
    /// order over `roleTemplateNames` makes the error deterministic.
    pub fn closure(&self, root: &RoleTemplate) -> Result<Vec<Arc<RoleTemplate>>, TemplateError> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        seen.insert(root.name().to_string());
        let mut stack: Vec<String> = root
            .role_template_names
            .clone()
            .unwrap_or_default()
            .into_iter()
            .rev()
            .collect();
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                return Err(TemplateError::CircularReference {
                    root: root.name().to_string(),
                    found: name,
                });
            }
            let template = self.get(&name)?;
            for child in template.role_template_names.iter().flatten().rev() {
                stack.push(child.clone());
            }
            out.push(template);
        }
        Ok(out)
    }

    /// The rules a single template grants, without inheritance.
    ///
    /// External templates take their rules from `externalRules` when set,
    /// falling back to the backing ClusterRole of the same name.
    pub fn own_rules(&self, template: &RoleTemplate) -> Vec<PolicyRule> {
        let mut rules = template.rules.clone().unwrap_or_default();
        if template.external {
            if let Some(external) = &template.external_rules {
                rules.extend(external.iter().cloned());
            } else if let Some(backing) = self.cluster_roles.get(None, template.name()) {
                rules.extend(backing.rules.clone().unwrap_or_default());
            }
        }
        rules
    }

    /// The effective rules of `template`: its own plus everything inherited.
    pub fn rules_for(&self, template: &RoleTemplate) -> Result<Vec<PolicyRule>, TemplateError> {
        let mut rules = self.own_rules(template);
        for inherited in self.closure(template)? {
            rules.extend(self.own_rules(&inherited));
        }
        Ok(rules)
    }

    /// The effective rules of a list of templates referenced by name.
    pub fn rules_for_names(&self, names: &[String]) -> Result<Vec<PolicyRule>, TemplateError> {
        let mut rules = Vec::new();
        for name in names {
            let template = self.get(name)?;
            rules.extend(self.rules_for(&template)?);
        }
        Ok(rules)
    }

    /// Whether the closure of the template named `candidate` reaches
    /// `target`. Used to refuse edges that would close a cycle.
    pub fn inherits(&self, candidate: &str, target: &str) -> Result<bool, TemplateError> {
        if candidate == target {
            return Ok(true);
        }
        let root = self.get(candidate)?;
        // a pre-existing cycle below `candidate` also makes the edge unsafe
        match self.closure(&root) {
            Ok(templates) => Ok(templates.iter().any(|t| t.name() == target)),
            Err(TemplateError::CircularReference { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Human-readable descriptions of every object referring to the template:
    /// other templates through `roleTemplateNames` and GlobalRoles through
    /// `inheritedClusterRoles`. A template with referrers cannot be deleted.
    pub fn referrers(&self, name: &str, global_roles: &dyn Store<GlobalRole>) -> Vec<String> {
        let mut found = Vec::new();
        for template in self.role_templates.state() {
            if template
                .role_template_names
                .iter()
                .flatten()
                .any(|n| n == name)
            {
                found.push(format!("roleTemplate {:?}", template.name()));
            }
        }
        for role in global_roles.state() {
            if role
                .inherited_cluster_roles
                .iter()
                .flatten()
                .any(|n| n == name)
            {
                found.push(format!(
                    "globalRole {:?}",
                    role.metadata.name.as_deref().unwrap_or_default()
                ));
            }
        }
        found
    }
}
