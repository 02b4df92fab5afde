//! Admitters for management.cattle.io/v3 Projects.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use parking_lot::Mutex;
use rand::Rng;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;
use webhook_core::patch;
use webhook_core::quantity::Quantity;

use crate::admission::{AdmitError, Admitter, Scope, SideEffects, WebhookOptions};
use crate::resources::{annotation, keys, label, set_creator_annotations};
use crate::stores::{ObjectSet, Store};
use crate::types::management::{Cluster, Project, ProjectStatus, RoleTemplate};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "projects")
}

const GENERATED_SUFFIX_LEN: usize = 5;
const GENERATION_ATTEMPTS: usize = 10;

fn parse_quantity(value: &str, field: &str) -> Result<Quantity, String> {
    value
        .parse()
        .map_err(|err| format!("{field}: {value:?} is not a valid quantity: {err}"))
}

/// Join segments with `-`, keeping the result a valid object name. Overlong
/// results are truncated and disambiguated with a hash of the full string.
fn safe_concat(parts: &[&str]) -> String {
    let joined = parts.join("-");
    if joined.len() <= 63 {
        return joined;
    }
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in joined.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{}-{:05x}", &joined[..57], hash & 0xfffff)
}

/// Admits creates, updates, and deletes of Projects.
pub struct Validator {
    clusters: Arc<dyn Store<Cluster>>,
    namespaces: Arc<dyn Store<Namespace>>,
}

impl Validator {
    /// Build the validator over the cluster and namespace caches.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            clusters: stores.clusters.clone(),
            namespaces: stores.namespaces.clone(),
        }
    }

    /// Number of namespaces already assigned to the project.
    fn member_namespace_count(&self, cluster: &str, project: &str) -> u64 {
        let project_id = format!("{cluster}:{project}");
        self.namespaces
            .state()
            .iter()
            .filter(|ns| annotation(&ns.metadata, keys::PROJECT_ID_ANN) == Some(project_id.as_str()))
            .count() as u64
    }

    fn validate_quotas(&self, req: &AdmissionRequest, old: Option<&Project>, new: &Project) -> Result<(), String> {
        let project_quota = new.spec.resource_quota.as_ref().and_then(|q| q.limit.as_ref());
        let namespace_quota = new
            .spec
            .namespace_default_resource_quota
            .as_ref()
            .and_then(|q| q.limit.as_ref());

        let (project_quota, namespace_quota) = match (project_quota, namespace_quota) {
            (None, None) => return Ok(()),
            (Some(p), Some(n)) => (p, n),
            (Some(_), None) => {
                return Err("resourceQuota requires namespaceDefaultResourceQuota".to_string())
            }
            (None, Some(_)) => {
                return Err("namespaceDefaultResourceQuota requires resourceQuota".to_string())
            }
        };

        let project_keys: Vec<&String> = project_quota.keys().collect();
        let namespace_keys: Vec<&String> = namespace_quota.keys().collect();
        if project_keys != namespace_keys {
            return Err(
                "resourceQuota.limit and namespaceDefaultResourceQuota.limit must set the same resources"
                    .to_string(),
            );
        }

        let members = self.member_namespace_count(
            &new.spec.cluster_name,
            new.metadata.name.as_deref().unwrap_or(&req.name),
        );

        for (resource, project_value) in project_quota {
            let total = parse_quantity(project_value, &format!("resourceQuota.limit.{resource}"))?;
            let per_namespace = parse_quantity(
                &namespace_quota[resource],
                &format!("namespaceDefaultResourceQuota.limit.{resource}"),
            )?;
            if per_namespace > total {
                return Err(format!(
                    "namespaceDefaultResourceQuota.limit.{resource} must not exceed resourceQuota.limit.{resource}"
                ));
            }
            if let Some(used) = old
                .and_then(|o| o.spec.resource_quota.as_ref())
                .and_then(|q| q.used_limit.as_ref())
                .and_then(|used| used.get(resource))
            {
                let used = parse_quantity(used, &format!("resourceQuota.usedLimit.{resource}"))?;
                if used > total {
                    return Err(format!(
                        "resourceQuota.limit.{resource} is below the quota already in use"
                    ));
                }
            }
            let committed = per_namespace
                .checked_mul(members)
                .ok_or_else(|| format!("namespaceDefaultResourceQuota.limit.{resource} overflows"))?;
            if committed > total {
                return Err(format!(
                    "namespaceDefaultResourceQuota.limit.{resource} times {members} project namespaces exceeds resourceQuota.limit.{resource}"
                ));
            }
        }
        Ok(())
    }

    fn validate_container_limits(new: &Project) -> Result<(), String> {
        let Some(limits) = &new.spec.container_default_resource_limit else {
            return Ok(());
        };
        let pairs = [
            ("Cpu", &limits.requests_cpu, &limits.limits_cpu),
            ("Memory", &limits.requests_memory, &limits.limits_memory),
        ];
        for (suffix, request, limit) in pairs {
            let request = request
                .as_deref()
                .map(|v| parse_quantity(v, &format!("containerDefaultResourceLimit.requests{suffix}")))
                .transpose()?;
            let limit = limit
                .as_deref()
                .map(|v| parse_quantity(v, &format!("containerDefaultResourceLimit.limits{suffix}")))
                .transpose()?;
            if let (Some(request), Some(limit)) = (request, limit) {
                if request > limit {
                    return Err(format!(
                        "containerDefaultResourceLimit.requests{suffix} must not exceed limits{suffix}"
                    ));
                }
            }
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
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Update, Operation::Delete],
            scope: Scope::Namespaced,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<Project>()?;
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            let old = objects
                .old
                .ok_or_else(|| AdmitError::Internal("delete request without old object".into()))?;
            if label(&old.metadata, keys::SYSTEM_PROJECT_LABEL) == Some("true") {
                return Ok(response.deny("the system project cannot be deleted"));
            }
            return Ok(response);
        }

        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        if Some(new.spec.cluster_name.as_str()) != req.namespace.as_deref() {
            return Ok(response.invalid("spec.clusterName must match the project's namespace"));
        }
        if self.clusters.get(None, &new.spec.cluster_name).is_none() {
            return Ok(response.invalid(format!(
                "cluster {:?} was not found",
                new.spec.cluster_name
            )));
        }

        if let Some(old) = &objects.old {
            let old_backing = old
                .status
                .as_ref()
                .and_then(|s| s.backing_namespace.as_deref())
                .unwrap_or_default();
            let new_backing = new
                .status
                .as_ref()
                .and_then(|s| s.backing_namespace.as_deref())
                .unwrap_or_default();
            if !old_backing.is_empty() && old_backing != new_backing {
                return Ok(response.invalid("status.backingNamespace is immutable"));
            }
        }

        if let Err(message) = self.validate_quotas(req, objects.old.as_ref(), &new) {
            return Ok(response.invalid(message));
        }
        if let Err(message) = Self::validate_container_limits(&new) {
            return Ok(response.invalid(message));
        }
        Ok(response)
    }
}

/// Mutates project creates (name generation, backing namespace, creator
/// metadata) and updates (legacy backing-namespace fill).
pub struct Mutator {
    projects: Arc<dyn Store<Project>>,
    namespaces: Arc<dyn Store<Namespace>>,
    role_templates: Arc<dyn Store<RoleTemplate>>,
    // serializes name generation per cluster; cross-replica races surface as
    // apiserver uniqueness conflicts
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Mutator {
    /// Build the mutator over the project, namespace, and template caches.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            projects: stores.projects.clone(),
            namespaces: stores.namespaces.clone(),
            role_templates: stores.role_templates.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn cluster_lock(&self, cluster: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(cluster.to_string())
            .or_default()
            .clone()
    }

    fn random_suffix() -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::rng();
        (0..GENERATED_SUFFIX_LEN)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect()
    }

    fn taken(&self, cluster: &str, name: &str, backing: &str) -> bool {
        self.projects.get(Some(cluster), name).is_some()
            || self.namespaces.get(None, backing).is_some()
    }

    /// The role templates granted to every project creator.
    fn creator_role_templates(&self) -> Vec<String> {
        let mut required: Vec<String> = self
            .role_templates
            .state()
            .iter()
            .filter(|template| template.project_creator_default && !template.locked)
            .map(|template| template.name().to_string())
            .collect();
        required.sort();
        required
    }

    fn mutate_create(&self, req: &AdmissionRequest, project: &mut Project) -> Result<(), AdmissionResponse> {
        let cluster = project.spec.cluster_name.clone();
        let lock = self.cluster_lock(&cluster);
        let _guard = lock.lock();

        let mut name = project.metadata.name.clone().unwrap_or_default();
        if name.is_empty() {
            let Some(prefix) = project.metadata.generate_name.clone() else {
                return Err(AdmissionResponse::from(req)
                    .invalid("metadata.name or metadata.generateName is required"));
            };
            let mut generated = None;
            for _ in 0..GENERATION_ATTEMPTS {
                let candidate = format!("{prefix}{}", Self::random_suffix());
                let backing = safe_concat(&[&cluster, &candidate.to_lowercase()]);
                if !self.taken(&cluster, &candidate, &backing) {
                    generated = Some(candidate);
                    break;
                }
            }
            let Some(generated) = generated else {
                return Err(AdmissionResponse::from(req)
                    .conflict("failed to generate a free project name"));
            };
            name = generated;
            project.metadata.name = Some(name.clone());
        }

        let backing = safe_concat(&[&cluster, &name.to_lowercase()]);
        if self.namespaces.get(None, &backing).is_some() {
            return Err(AdmissionResponse::from(req).conflict(format!(
                "backing namespace {backing:?} already exists"
            )));
        }
        project
            .status
            .get_or_insert_with(ProjectStatus::default)
            .backing_namespace = Some(backing);

        set_creator_annotations(&mut project.metadata, &req.user_info);
        let required = self.creator_role_templates();
        let bindings = serde_json::json!({ "required": required }).to_string();
        project
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::default)
            .insert(keys::CREATOR_ROLE_BINDINGS_ANN.to_string(), bindings);
        Ok(())
    }
}

#[async_trait]
impl Admitter for Mutator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Update],
            scope: Scope::Namespaced,
            side_effects: SideEffects::NoneOnDryRun,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let mut project = req.decode_new::<Project>()?;
        let original = req
            .object
            .clone()
            .ok_or_else(|| AdmitError::Internal("request without object".into()))?;

        match req.operation {
            Operation::Create => {
                if let Err(rejection) = self.mutate_create(req, &mut project) {
                    return Ok(rejection);
                }
            }
            Operation::Update => {
                // legacy projects predate backing namespaces; fall back to the
                // project name
                let status = project.status.get_or_insert_with(ProjectStatus::default);
                if status.backing_namespace.as_deref().unwrap_or_default().is_empty() {
                    status.backing_namespace = project.metadata.name.clone();
                }
            }
            _ => return Ok(AdmissionResponse::from(req)),
        }

        let patch = patch::diff(&original, &project)?;
        Ok(AdmissionResponse::from(req).with_patch(patch)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::{patched, request};
    use crate::stores::MemStores;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    fn stores_with_cluster() -> MemStores {
        let stores = MemStores::default();
        stores.clusters.insert(
            None,
            "c1",
            Cluster {
                metadata: ObjectMeta {
                    name: Some("c1".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        stores
    }

    fn project_body(quota: Option<serde_json::Value>) -> serde_json::Value {
        let mut body = json!({
            "metadata": {"name": "p-abc", "namespace": "c1"},
            "spec": {"clusterName": "c1"}
        });
        if let Some(quota) = quota {
            body["spec"]["resourceQuota"] = quota["resourceQuota"].clone();
            body["spec"]["namespaceDefaultResourceQuota"] =
                quota["namespaceDefaultResourceQuota"].clone();
        }
        body
    }

    #[tokio::test]
    async fn cluster_must_exist_and_match_namespace() {
        let stores = stores_with_cluster();
        let v = Validator::new(&stores.object_set());

        let req = request(
            gvr(),
            "Project",
            "p-abc",
            Some("c1"),
            Operation::Create,
            "admin",
            Some(project_body(None)),
            None,
        );
        assert!(v.admit(&req).await.unwrap().allowed);

        let req = request(
            gvr(),
            "Project",
            "p-abc",
            Some("other"),
            Operation::Create,
            "admin",
            Some(project_body(None)),
            None,
        );
        assert!(!v.admit(&req).await.unwrap().allowed);

        let mut body = project_body(None);
        body["spec"]["clusterName"] = json!("ghost");
        body["metadata"]["namespace"] = json!("ghost");
        let req = request(
            gvr(),
            "Project",
            "p-abc",
            Some("ghost"),
            Operation::Create,
            "admin",
            Some(body),
            None,
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("not found"));
    }

    #[tokio::test]
    async fn quotas_must_be_paired_and_consistent() {
        let stores = stores_with_cluster();
        let v = Validator::new(&stores.object_set());

        // project quota without namespace default
        let mut body = project_body(None);
        body["spec"]["resourceQuota"] = json!({"limit": {"pods": "10"}});
        let req = request(gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin", Some(body), None);
        assert!(!v.admit(&req).await.unwrap().allowed);

        // differing key sets
        let quota = json!({
            "resourceQuota": {"limit": {"pods": "10"}},
            "namespaceDefaultResourceQuota": {"limit": {"services": "5"}}
        });
        let req = request(
            gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin",
            Some(project_body(Some(quota))), None,
        );
        assert!(!v.admit(&req).await.unwrap().allowed);

        // namespace default above the project total
        let quota = json!({
            "resourceQuota": {"limit": {"pods": "10"}},
            "namespaceDefaultResourceQuota": {"limit": {"pods": "20"}}
        });
        let req = request(
            gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin",
            Some(project_body(Some(quota))), None,
        );
        assert!(!v.admit(&req).await.unwrap().allowed);

        // consistent quotas pass
        let quota = json!({
            "resourceQuota": {"limit": {"pods": "10", "services": "4"}},
            "namespaceDefaultResourceQuota": {"limit": {"pods": "5", "services": "2"}}
        });
        let req = request(
            gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin",
            Some(project_body(Some(quota))), None,
        );
        let res = v.admit(&req).await.unwrap();
        assert!(res.allowed, "{:?}", res.result);
    }

    #[tokio::test]
    async fn used_quota_limits_shrinking() {
        let stores = stores_with_cluster();
        let v = Validator::new(&stores.object_set());
        let old = json!({
            "metadata": {"name": "p-abc", "namespace": "c1"},
            "spec": {
                "clusterName": "c1",
                "resourceQuota": {"limit": {"pods": "20"}, "usedLimit": {"pods": "15"}},
                "namespaceDefaultResourceQuota": {"limit": {"pods": "5"}}
            }
        });
        let quota = json!({
            "resourceQuota": {"limit": {"pods": "10"}},
            "namespaceDefaultResourceQuota": {"limit": {"pods": "5"}}
        });
        let req = request(
            gvr(), "Project", "p-abc", Some("c1"), Operation::Update, "admin",
            Some(project_body(Some(quota))), Some(old),
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("already in use"));
    }

    #[tokio::test]
    async fn member_namespaces_bound_the_default_quota() {
        let stores = stores_with_cluster();
        for i in 0..3 {
            stores.namespaces.insert(
                None,
                &format!("ns{i}"),
                Namespace {
                    metadata: ObjectMeta {
                        name: Some(format!("ns{i}")),
                        annotations: Some(
                            [(keys::PROJECT_ID_ANN.to_string(), "c1:p-abc".to_string())].into(),
                        ),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            );
        }
        let v = Validator::new(&stores.object_set());
        // 3 namespaces x default 4 = 12 > total 10
        let quota = json!({
            "resourceQuota": {"limit": {"pods": "10"}},
            "namespaceDefaultResourceQuota": {"limit": {"pods": "4"}}
        });
        let req = request(
            gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin",
            Some(project_body(Some(quota))), None,
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("project namespaces"));
    }

    #[tokio::test]
    async fn container_limits_require_requests_below_limits() {
        let stores = stores_with_cluster();
        let v = Validator::new(&stores.object_set());
        let mut body = project_body(None);
        body["spec"]["containerDefaultResourceLimit"] = json!({
            "requestsCpu": "500m", "limitsCpu": "250m"
        });
        let req = request(gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin", Some(body), None);
        assert!(!v.admit(&req).await.unwrap().allowed);

        let mut body = project_body(None);
        body["spec"]["containerDefaultResourceLimit"] = json!({
            "requestsCpu": "250m", "limitsCpu": "1", "requestsMemory": "64Mi", "limitsMemory": "128Mi"
        });
        let req = request(gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin", Some(body), None);
        assert!(v.admit(&req).await.unwrap().allowed);

        let mut body = project_body(None);
        body["spec"]["containerDefaultResourceLimit"] = json!({"requestsCpu": "abc"});
        let req = request(gvr(), "Project", "p-abc", Some("c1"), Operation::Create, "admin", Some(body), None);
        assert!(!v.admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn system_project_cannot_be_deleted() {
        let stores = stores_with_cluster();
        let v = Validator::new(&stores.object_set());
        let old = json!({
            "metadata": {
                "name": "p-system",
                "namespace": "c1",
                "labels": {"authz.management.cattle.io/system-project": "true"}
            },
            "spec": {"clusterName": "c1"}
        });
        let req = request(gvr(), "Project", "p-system", Some("c1"), Operation::Delete, "admin", None, Some(old));
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.result.unwrap().code, 403);
    }

    #[tokio::test]
    async fn backing_namespace_is_immutable_once_set() {
        let stores = stores_with_cluster();
        let v = Validator::new(&stores.object_set());
        let old = json!({
            "metadata": {"name": "p-abc", "namespace": "c1"},
            "spec": {"clusterName": "c1"},
            "status": {"backingNamespace": "c1-p-abc"}
        });
        let mut new = old.clone();
        new["status"]["backingNamespace"] = json!("c1-elsewhere");
        let req = request(gvr(), "Project", "p-abc", Some("c1"), Operation::Update, "admin", Some(new), Some(old));
        assert!(!v.admit(&req).await.unwrap().allowed);
    }

    fn mutator_stores() -> MemStores {
        let stores = MemStores::default();
        for (name, default, locked) in [
            ("project-owner", true, false),
            ("project-locked", true, true),
            ("cluster-owner", false, false),
        ] {
            stores.role_templates.insert(
                None,
                name,
                RoleTemplate {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        ..Default::default()
                    },
                    context: "project".to_string(),
                    project_creator_default: default,
                    locked,
                    ..Default::default()
                },
            );
        }
        stores
    }

    #[tokio::test]
    async fn create_generates_name_and_backing_namespace() {
        let stores = mutator_stores();
        let m = Mutator::new(&stores.object_set());
        let req = request(
            gvr(),
            "Project",
            "",
            Some("c1"),
            Operation::Create,
            "u-admin",
            Some(json!({
                "metadata": {"generateName": "p-", "namespace": "c1"},
                "spec": {"clusterName": "c1"}
            })),
            None,
        );
        let res = m.admit(&req).await.unwrap();
        assert!(res.allowed && res.has_patch());

        let doc = patched(&req, &res);
        let name = doc["metadata"]["name"].as_str().unwrap();
        assert!(name.starts_with("p-") && name.len() == 2 + GENERATED_SUFFIX_LEN, "{name}");
        assert_eq!(
            doc["status"]["backingNamespace"].as_str().unwrap(),
            format!("c1-{}", name.to_lowercase())
        );
        assert_eq!(doc["metadata"]["annotations"]["field.cattle.io/creatorId"], "u-admin");
        let bindings: serde_json::Value = serde_json::from_str(
            doc["metadata"]["annotations"]["authz.management.cattle.io/creator-role-bindings"]
                .as_str()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(bindings, json!({"required": ["project-owner"]}));
    }

    #[tokio::test]
    async fn create_rejects_pre_existing_backing_namespace() {
        let stores = mutator_stores();
        stores.namespaces.insert(
            None,
            "c1-p-abc",
            Namespace {
                metadata: ObjectMeta {
                    name: Some("c1-p-abc".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let m = Mutator::new(&stores.object_set());
        let req = request(
            gvr(),
            "Project",
            "p-abc",
            Some("c1"),
            Operation::Create,
            "u-admin",
            Some(json!({
                "metadata": {"name": "p-abc", "namespace": "c1"},
                "spec": {"clusterName": "c1"}
            })),
            None,
        );
        let res = m.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.result.unwrap().code, 409);
    }

    #[tokio::test]
    async fn update_backfills_legacy_backing_namespace() {
        let stores = mutator_stores();
        let m = Mutator::new(&stores.object_set());
        let body = json!({
            "metadata": {"name": "legacy", "namespace": "c1"},
            "spec": {"clusterName": "c1"}
        });
        let req = request(
            gvr(),
            "Project",
            "legacy",
            Some("c1"),
            Operation::Update,
            "u-admin",
            Some(body.clone()),
            Some(body),
        );
        let res = m.admit(&req).await.unwrap();
        assert!(res.allowed && res.has_patch());
        let doc = patched(&req, &res);
        assert_eq!(doc["status"]["backingNamespace"], "legacy");
    }

    #[test]
    fn safe_concat_truncates_deterministically() {
        assert_eq!(safe_concat(&["c1", "p-abc"]), "c1-p-abc");
        let long = "x".repeat(80);
        let a = safe_concat(&["c1", &long]);
        let b = safe_concat(&["c1", &long]);
        assert_eq!(a, b);
        assert!(a.len() <= 63);
        let other = safe_concat(&["c1", &"y".repeat(80)]);
        assert_ne!(a, other);
    }
}
