//! Admitters for core/v1 Secrets.
//!
//! Secrets can own RBAC objects (Roles and RoleBindings carrying an owner
//! reference to the secret). The validator refuses orphaning deletes of such
//! secrets; the mutator redacts owner-granting rules when the secret goes
//! away, stamps creator annotations on cloud credentials, and hashes local
//! user passwords before they are persisted.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{DeleteOptions, ObjectMeta};
use k8s_openapi::ByteString;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha3::Sha3_512;
use tracing::info;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, Scope, SideEffects, WebhookOptions};
use crate::resources::{annotation, keys, label};
use crate::stores::{ObjectSet, RoleWriter, Store, WriteError};
use crate::types::management::{Setting, User};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("", "v1", "secrets")
}

/// Secret type carrying provisioning cloud credentials.
const CLOUD_CREDENTIAL_TYPE: &str = "provisioning.cattle.io/cloud-credential";
/// Namespace holding local user password secrets.
const LOCAL_PASSWORDS_NAMESPACE: &str = "cattle-local-user-passwords";
/// Hash algorithm written by the mutator.
const HASH_PBKDF2_SHA3_512: &str = "pbkdf2sha3512";
/// PBKDF2 iteration count.
const HASH_ITERATIONS: u32 = 210_000;
/// Salt and derived-key size in bytes.
const HASH_BYTES: usize = 32;
/// Setting naming the minimum password length.
const PASSWORD_MIN_LENGTH_SETTING: &str = "password-min-length";
/// Fallback when the setting is absent or unparsable.
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 12;

const ORPHAN_DELETE_MESSAGE: &str = "A secret which owns RBAC objects cannot be deleted \
with OrphanDependents: true or PropagationPolicy: Orphan";

fn owns(meta: &ObjectMeta, secret_name: &str) -> bool {
    meta.owner_references.iter().flatten().any(|owner| {
        owner.kind == "Secret" && owner.api_version == "v1" && owner.name == secret_name
    })
}

fn owned_roles(roles: &dyn Store<Role>, namespace: &str, secret_name: &str) -> Vec<Arc<Role>> {
    roles
        .state()
        .into_iter()
        .filter(|role| role.metadata.namespace.as_deref() == Some(namespace))
        .filter(|role| owns(&role.metadata, secret_name))
        .collect()
}

fn owns_any_rbac(
    roles: &dyn Store<Role>,
    role_bindings: &dyn Store<RoleBinding>,
    namespace: &str,
    secret_name: &str,
) -> bool {
    !owned_roles(roles, namespace, secret_name).is_empty()
        || role_bindings
            .state()
            .iter()
            .filter(|rb| rb.metadata.namespace.as_deref() == Some(namespace))
            .any(|rb| owns(&rb.metadata, secret_name))
}

/// Whether a rule grants read access to exactly this secret by name. Only
/// this shape is redacted; anything broader is deliberately left untouched.
fn grants_secret_access(rule: &PolicyRule, secret_name: &str) -> bool {
    rule.api_groups
        .iter()
        .flatten()
        .all(|group| group.is_empty() || group == "*")
        && rule
            .resources
            .as_deref()
            .is_some_and(|resources| resources.len() == 1 && resources[0] == "secrets")
        && rule
            .resource_names
            .as_deref()
            .is_some_and(|names| names.len() == 1 && names[0] == secret_name)
        && rule.verbs.iter().any(|verb| verb == "get" || verb == "*")
}

/// Admits deletes (orphan protection) and project-scoped secret writes.
pub struct Validator {
    roles: Arc<dyn Store<Role>>,
    role_bindings: Arc<dyn Store<RoleBinding>>,
}

impl Validator {
    /// Build the validator over the RBAC caches.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            roles: stores.roles.clone(),
            role_bindings: stores.role_bindings.clone(),
        }
    }

    fn validate_project_scoped(secret: &Secret) -> Result<(), String> {
        let Some(value) = label(&secret.metadata, keys::PROJECT_SCOPED_LABEL) else {
            return Ok(());
        };
        if value != "original" {
            return Err(format!(
                "label {} must be \"original\", got {value:?}",
                keys::PROJECT_SCOPED_LABEL
            ));
        }
        let Some(project_id) = annotation(&secret.metadata, keys::PROJECT_ID_ANN) else {
            return Err(format!(
                "project-scoped secrets require the {} annotation",
                keys::PROJECT_ID_ANN
            ));
        };
        if !project_id
            .split_once(':')
            .is_some_and(|(cluster, project)| !cluster.is_empty() && !project.is_empty())
        {
            return Err(format!(
                "annotation {} must be of the form <clusterName>:<projectName>",
                keys::PROJECT_ID_ANN
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![
            WebhookOptions {
                operations: vec![Operation::Delete],
                scope: Scope::Namespaced,
                timeout_seconds: 10,
                ..Default::default()
            },
            WebhookOptions {
                operations: vec![Operation::Create, Operation::Update],
                scope: Scope::Namespaced,
                timeout_seconds: 10,
                name_suffix: Some("project-scoped"),
                object_selector: Some(
                    k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector {
                        match_labels: Some(
                            [(keys::PROJECT_SCOPED_LABEL.to_string(), "original".to_string())]
                                .into(),
                        ),
                        ..Default::default()
                    },
                ),
                ..Default::default()
            },
        ]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            let options: Option<DeleteOptions> = req.decode_options()?;
            let orphaning = options.as_ref().is_some_and(|opts| {
                opts.orphan_dependents == Some(true)
                    || opts.propagation_policy.as_deref() == Some("Orphan")
            });
            if !orphaning {
                return Ok(response);
            }
            let namespace = req.namespace_or_default();
            if owns_any_rbac(
                self.roles.as_ref(),
                self.role_bindings.as_ref(),
                namespace,
                &req.name,
            ) {
                return Ok(response.bad_request(ORPHAN_DELETE_MESSAGE));
            }
            return Ok(response);
        }

        let secret = req.decode_new::<Secret>()?;
        if let Err(message) = Self::validate_project_scoped(&secret) {
            return Ok(response.invalid(message));
        }
        Ok(response)
    }
}

/// Mutates secrets on create, update, and delete.
pub struct Mutator {
    roles: Arc<dyn Store<Role>>,
    users: Arc<dyn Store<User>>,
    settings: Arc<dyn Store<Setting>>,
    role_writer: Arc<dyn RoleWriter>,
}

impl Mutator {
    /// Build the mutator over the caches and the Role write-back seam.
    pub fn new(stores: &ObjectSet, role_writer: Arc<dyn RoleWriter>) -> Self {
        Self {
            roles: stores.roles.clone(),
            users: stores.users.clone(),
            settings: stores.settings.clone(),
            role_writer,
        }
    }

    fn password_min_length(&self) -> usize {
        self.settings
            .get(None, PASSWORD_MIN_LENGTH_SETTING)
            .and_then(|setting| {
                let value = if setting.value.is_empty() {
                    &setting.default
                } else {
                    &setting.value
                };
                value.parse().ok()
            })
            .unwrap_or(DEFAULT_PASSWORD_MIN_LENGTH)
    }

    /// Stamp the creator annotation onto new cloud credentials.
    fn mutate_cloud_credential(
        req: &AdmissionRequest,
        secret: &Secret,
        doc: &mut serde_json::Value,
    ) {
        if secret.type_.as_deref() != Some(CLOUD_CREDENTIAL_TYPE) {
            return;
        }
        if annotation(&secret.metadata, keys::NO_CREATOR_RBAC_ANN).is_some() {
            return;
        }
        let Some(username) = &req.user_info.username else {
            return;
        };
        doc["metadata"]["annotations"][keys::CREATOR_ID_ANN] =
            serde_json::Value::String(username.clone());
    }

    /// Hash not-yet-hashed local user passwords in place.
    fn mutate_local_password(
        &self,
        req: &AdmissionRequest,
        secret: &Secret,
        doc: &mut serde_json::Value,
    ) -> Result<(), String> {
        if req.namespace.as_deref() != Some(LOCAL_PASSWORDS_NAMESPACE) {
            return Ok(());
        }
        if annotation(&secret.metadata, keys::PASSWORD_HASH_ANN).is_some() {
            // already hashed (pbkdf2sha3512, bcrypt, ...): admit unchanged
            return Ok(());
        }
        let Some(user) = self.users.get(None, &req.name) else {
            return Ok(());
        };
        let Some(password) = secret.data.as_ref().and_then(|data| data.get("password")) else {
            return Ok(());
        };

        let min_length = self.password_min_length();
        if password.0.len() < min_length {
            return Err(format!(
                "password must be at least {min_length} characters"
            ));
        }
        if req.user_info.username.as_deref() == Some(std::str::from_utf8(&password.0).unwrap_or(""))
        {
            return Err("password cannot be the same as the username".to_string());
        }

        let mut salt = [0u8; HASH_BYTES];
        rand::rng().fill_bytes(&mut salt);
        let mut key = [0u8; HASH_BYTES];
        pbkdf2_hmac::<Sha3_512>(&password.0, &salt, HASH_ITERATIONS, &mut key);

        doc["data"]["password"] = base64_value(&key);
        doc["data"]["salt"] = base64_value(&salt);
        doc["metadata"]["annotations"][keys::PASSWORD_HASH_ANN] =
            serde_json::Value::String(HASH_PBKDF2_SHA3_512.to_string());
        doc["metadata"]["ownerReferences"] = serde_json::json!([{
            "apiVersion": "management.cattle.io/v3",
            "kind": "User",
            "name": user.metadata.name.clone().unwrap_or_default(),
            "uid": user.metadata.uid.clone().unwrap_or_default(),
        }]);
        Ok(())
    }

    /// Redact owner-granting rules on every Role owned by the deleted secret.
    async fn redact_owned_roles(&self, req: &AdmissionRequest) -> Result<(), AdmitError> {
        let namespace = req.namespace_or_default();
        for role in owned_roles(self.roles.as_ref(), namespace, &req.name) {
            let mut updated = (*role).clone();
            let mut changed = false;
            for rule in updated.rules.iter_mut().flatten() {
                if grants_secret_access(rule, &req.name) && rule.verbs != ["delete"] {
                    rule.verbs = vec!["delete".to_string()];
                    changed = true;
                }
            }
            if !changed {
                continue;
            }
            match self.role_writer.update(&updated).await {
                Ok(()) | Err(WriteError::NotFound) => {
                    info!(
                        role = updated.metadata.name.as_deref().unwrap_or_default(),
                        namespace, "redacted secret-owner role"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn base64_value(bytes: &[u8]) -> serde_json::Value {
    serde_json::to_value(ByteString(bytes.to_vec())).unwrap_or_default()
}

#[async_trait]
impl Admitter for Mutator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Update, Operation::Delete],
            scope: Scope::Namespaced,
            side_effects: SideEffects::NoneOnDryRun,
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            self.redact_owned_roles(req).await?;
            return Ok(response);
        }

        let secret = req.decode_new::<Secret>()?;
        let original = req
            .object
            .clone()
            .ok_or_else(|| AdmitError::Internal("request without object".into()))?;
        let mut doc = original.clone();

        if req.operation == Operation::Create {
            Self::mutate_cloud_credential(req, &secret, &mut doc);
        }
        if let Err(message) = self.mutate_local_password(req, &secret, &mut doc) {
            return Ok(response.invalid(message));
        }

        let patch = json_patch::diff(&original, &doc);
        Ok(response.with_patch(patch)?)
    }
}
