//! The per-resource admitter catalog.
//!
//! Each submodule owns one resource (or resource family) and exports its
//! validator and, where the contract calls for one, its mutator. The
//! [`catalog`] function wires every admitter against the shared caches and
//! returns the two families for registration.

use std::sync::Arc;

use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::admission::Admitter;
use crate::authz::escalation::{AccessReviewer, EscalationChecker};
use crate::authz::resolver::{principal_ids, RuleResolver};
use crate::stores::{ObjectSet, RoleWriter, Store};
use crate::types::management::User;

pub mod auditpolicy;
pub mod authconfig;
pub mod cluster;
pub mod clusterauthtoken;
pub mod clusterproxyconfig;
pub mod clusterrepo;
pub mod clusterroletemplatebinding;
pub mod feature;
pub mod fleetworkspace;
pub mod globalrole;
pub mod globalrolebinding;
pub mod machineconfig;
pub mod machinedeployment;
pub mod namespace;
pub mod nodedriver;
pub mod podsecurityadmission;
pub mod project;
pub mod projectroletemplatebinding;
pub mod provisioning_cluster;
pub mod proxyendpoint;
pub mod rbac;
pub mod roletemplate;
pub mod secret;
pub mod setting;
pub mod token;
pub mod user;
pub mod userattribute;

/// Annotation and label keys with normative meaning across the catalog.
pub mod keys {
    /// Username of the creator; set by create mutators, immutable, removable.
    pub const CREATOR_ID_ANN: &str = "field.cattle.io/creatorId";
    /// Suppresses `creatorId` assignment when present.
    pub const NO_CREATOR_RBAC_ANN: &str = "field.cattle.io/no-creator-rbac";
    /// Principal id of the creator; requires a matching `creatorId`.
    pub const CREATOR_PRINCIPAL_ANN: &str = "field.cattle.io/creator-principal-name";
    /// Project membership in the form `<cluster>:<project>`.
    pub const PROJECT_ID_ANN: &str = "field.cattle.io/projectId";
    /// Role templates granted to the project creator.
    pub const CREATOR_ROLE_BINDINGS_ANN: &str = "authz.management.cattle.io/creator-role-bindings";
    /// Ownership back-pointer to a GlobalRole; immutable once set.
    pub const GR_OWNER_LABEL: &str = "authz.management.cattle.io/gr-owner";
    /// Ownership back-pointer to a GlobalRoleBinding; immutable once set.
    pub const GRB_OWNER_LABEL: &str = "authz.management.cattle.io/grb-owner";
    /// Marks the undeletable system project.
    pub const SYSTEM_PROJECT_LABEL: &str = "authz.management.cattle.io/system-project";
    /// Hash algorithm of a stored password secret.
    pub const PASSWORD_HASH_ANN: &str = "cattle.io/password-hash";
    /// Opts a secret into the project-scoped validator.
    pub const PROJECT_SCOPED_LABEL: &str = "cattle.io/project-scoped";
}

pub(crate) fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()
        .and_then(|anns| anns.get(key))
        .map(String::as_str)
}

pub(crate) fn label<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

pub(crate) fn deleting(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

/// The creator-annotation state machine shared by every resource carrying
/// them: `creatorId` and `creator-principal-name` may be set at creation and
/// removed later, never added late or changed.
pub(crate) fn validate_creator_annotation_transitions(
    old: &ObjectMeta,
    new: &ObjectMeta,
) -> Result<(), String> {
    for key in [keys::CREATOR_ID_ANN, keys::CREATOR_PRINCIPAL_ANN] {
        match (annotation(old, key), annotation(new, key)) {
            (Some(before), Some(after)) if before != after => {
                return Err(format!("annotation {key} is immutable"));
            }
            (None, Some(_)) => {
                return Err(format!("annotation {key} cannot be added after creation"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// On create, a `creator-principal-name` annotation must be accompanied by a
/// `creatorId` naming a User that carries the principal.
pub(crate) fn validate_creator_principal(
    meta: &ObjectMeta,
    users: &dyn Store<User>,
) -> Result<(), String> {
    let Some(principal) = annotation(meta, keys::CREATOR_PRINCIPAL_ANN) else {
        return Ok(());
    };
    let Some(creator) = annotation(meta, keys::CREATOR_ID_ANN) else {
        return Err(format!(
            "annotation {} requires annotation {}",
            keys::CREATOR_PRINCIPAL_ANN,
            keys::CREATOR_ID_ANN
        ));
    };
    let carries_principal = users
        .get(None, creator)
        .is_some_and(|user| user.principal_ids.iter().flatten().any(|p| p == principal));
    if !carries_principal {
        return Err(format!(
            "user {creator:?} does not carry principal {principal:?}"
        ));
    }
    Ok(())
}

/// Stamp the creator annotations onto a mutated copy, honouring the
/// `no-creator-rbac` opt-out.
pub(crate) fn set_creator_annotations(meta: &mut ObjectMeta, user: &UserInfo) {
    if annotation(meta, keys::NO_CREATOR_RBAC_ANN).is_some() {
        return;
    }
    let Some(username) = user.username.clone() else {
        return;
    };
    let annotations = meta.annotations.get_or_insert_with(Default::default);
    annotations.insert(keys::CREATOR_ID_ANN.to_string(), username);
    if let Some(principal) = principal_ids(user).next() {
        annotations.insert(keys::CREATOR_PRINCIPAL_ANN.to_string(), principal.to_string());
    }
}

/// Exactly one subject field of a binding may be set.
pub(crate) fn exactly_one_subject(fields: &[(&str, Option<&str>)]) -> Result<(), String> {
    let set: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_some_and(|v| !v.is_empty()))
        .map(|(name, _)| *name)
        .collect();
    match set.len() {
        1 => Ok(()),
        0 => Err(format!(
            "binding must name exactly one subject: one of {} is required",
            fields
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        )),
        _ => Err(format!(
            "binding must name exactly one subject, got {}",
            set.join(", ")
        )),
    }
}

/// Subject identity fields may be filled in once but never changed or
/// cleared afterwards.
pub(crate) fn validate_subject_transition(
    field: &str,
    old: Option<&str>,
    new: Option<&str>,
) -> Result<(), String> {
    match (old, new) {
        (Some(before), Some(after)) if before != after => {
            Err(format!("{field} cannot be changed once set"))
        }
        (Some(_), None) => Err(format!("{field} cannot be removed once set")),
        _ => Ok(()),
    }
}

/// Scoping and role-reference fields are immutable after creation.
pub(crate) fn validate_immutable(field: &str, old: &str, new: &str) -> Result<(), String> {
    if old != new {
        Err(format!("{field} is immutable"))
    } else {
        Ok(())
    }
}

/// Every admitter of the engine, split by webhook family.
pub struct Catalog {
    /// Admitters behind the validating configuration.
    pub validators: Vec<Arc<dyn Admitter>>,
    /// Admitters behind the mutating configuration.
    pub mutators: Vec<Arc<dyn Admitter>>,
}

/// Wire the full catalog against the shared caches, the access-review
/// client, and the role write-back seam.
pub fn catalog(
    stores: &ObjectSet,
    reviewer: Arc<dyn AccessReviewer>,
    role_writer: Arc<dyn RoleWriter>,
) -> Catalog {
    let resolver = RuleResolver::new(stores);
    let checker = EscalationChecker::new(resolver, reviewer);

    let validators: Vec<Arc<dyn Admitter>> = vec![
        Arc::new(globalrole::Validator::new(checker.clone())),
        Arc::new(globalrolebinding::Validator::new(
            stores.global_roles.clone(),
            checker.clone(),
        )),
        Arc::new(roletemplate::Validator::new(
            stores.global_roles.clone(),
            checker.clone(),
        )),
        Arc::new(clusterroletemplatebinding::Validator::new(
            stores.cluster_role_template_bindings.clone(),
            checker.clone(),
        )),
        Arc::new(projectroletemplatebinding::Validator::new(
            stores.projects.clone(),
            checker.clone(),
        )),
        Arc::new(project::Validator::new(stores)),
        Arc::new(secret::Validator::new(stores)),
        Arc::new(namespace::Validator::new(stores, checker.clone())),
        Arc::new(rbac::OwnerLabelValidator::roles()),
        Arc::new(rbac::OwnerLabelValidator::role_bindings()),
        Arc::new(rbac::OwnerLabelValidator::cluster_roles()),
        Arc::new(rbac::OwnerLabelValidator::cluster_role_bindings()),
        Arc::new(authconfig::Validator::default()),
        Arc::new(cluster::Validator::new(stores)),
        Arc::new(clusterproxyconfig::Validator::new(stores)),
        Arc::new(feature::Validator::default()),
        Arc::new(fleetworkspace::Validator::new(stores)),
        Arc::new(nodedriver::Validator::default()),
        Arc::new(podsecurityadmission::Validator::new(stores)),
        Arc::new(proxyendpoint::Validator::new(stores)),
        Arc::new(setting::Validator::default()),
        Arc::new(token::Validator::default()),
        Arc::new(user::Validator::new(stores)),
        Arc::new(userattribute::Validator::new(stores)),
        Arc::new(provisioning_cluster::Validator::new(stores)),
        Arc::new(machineconfig::Validator::new(stores)),
        Arc::new(clusterrepo::Validator::default()),
        Arc::new(clusterauthtoken::Validator::default()),
        Arc::new(machinedeployment::ScaleValidator::default()),
        Arc::new(auditpolicy::Validator::default()),
    ];

    let mutators: Vec<Arc<dyn Admitter>> = vec![
        Arc::new(secret::Mutator::new(stores, role_writer)),
        Arc::new(project::Mutator::new(stores)),
        Arc::new(provisioning_cluster::Mutator::default()),
        Arc::new(machineconfig::Mutator::default()),
        Arc::new(fleetworkspace::Mutator::default()),
        Arc::new(clusterroletemplatebinding::Mutator::default()),
        Arc::new(projectroletemplatebinding::Mutator::default()),
    ];

    Catalog {
        validators,
        mutators,
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use webhook_core::admission::{AdmissionRequest, AdmissionReview, Operation};

    /// Build a typed admission request for admitter tests.
    pub fn request(
        gvr: webhook_core::gvk::GroupVersionResource,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        operation: Operation,
        username: &str,
        object: Option<serde_json::Value>,
        old_object: Option<serde_json::Value>,
    ) -> AdmissionRequest {
        let op = match operation {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        };
        let review: AdmissionReview = serde_json::from_value(serde_json::json!({
            "kind": "AdmissionReview",
            "apiVersion": "admission.k8s.io/v1",
            "request": {
                "uid": "test-uid",
                "kind": {"group": gvr.group, "version": gvr.version, "kind": kind},
                "resource": gvr,
                "name": name,
                "namespace": namespace,
                "operation": op,
                "userInfo": {"username": username, "groups": ["system:authenticated"]},
                "object": object,
                "oldObject": old_object,
                "dryRun": false
            }
        }))
        .unwrap();
        review.try_into().unwrap()
    }

    /// Apply a response patch to the request object and return the result.
    pub fn patched(req: &AdmissionRequest, res: &webhook_core::admission::AdmissionResponse) -> serde_json::Value {
        let mut doc = req.object.clone().unwrap();
        if let Some(patch) = &res.patch {
            let ops: json_patch::Patch = serde_json::from_slice(&patch.0).unwrap();
            json_patch::patch(&mut doc, &ops).unwrap();
        }
        doc
    }
}
