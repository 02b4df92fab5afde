//! JSON-Patch construction for mutating admitters.
//!
//! Mutators deep-copy the decoded object, apply every edit in memory, then
//! diff the result against the raw request payload; the single resulting
//! RFC 6902 patch goes on the response.

use serde::Serialize;
use thiserror::Error;

/// Failed to produce a patch from a mutated object.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The mutated object did not serialize.
    #[error("failed to serialize mutated object: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Diff the original raw payload against a mutated copy.
///
/// The mutated type must round-trip every field of the original payload
/// (unknown fields included), otherwise the diff would strip them.
pub fn diff<T: Serialize>(original: &serde_json::Value, mutated: &T) -> Result<json_patch::Patch, PatchError> {
    let new = serde_json::to_value(mutated)?;
    Ok(json_patch::diff(original, &new))
}

#[cfg(test)]
mod test {
    use super::diff;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Obj {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
        #[serde(flatten)]
        rest: BTreeMap<String, serde_json::Value>,
    }

    #[test]
    fn diff_emits_only_the_edits() {
        let original = json!({
            "metadata": {"name": "p-abcde", "namespace": "c1"},
            "spec": {"clusterName": "c1"}
        });
        let mut obj: Obj = serde_json::from_value(original.clone()).unwrap();
        obj.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert("field.cattle.io/creatorId".to_string(), "u-abc".to_string());

        let patch = diff(&original, &obj).unwrap();
        let applied = {
            let mut doc = original.clone();
            json_patch::patch(&mut doc, &patch).unwrap();
            doc
        };
        assert_eq!(
            applied["metadata"]["annotations"]["field.cattle.io/creatorId"],
            "u-abc"
        );
        // untouched fields survive the round trip
        assert_eq!(applied["spec"]["clusterName"], "c1");
        assert_eq!(applied["metadata"]["name"], "p-abcde");
    }

    #[test]
    fn unchanged_object_yields_empty_patch() {
        let original = json!({"metadata": {"name": "x"}, "spec": {"a": 1}});
        let obj: Obj = serde_json::from_value(original.clone()).unwrap();
        assert!(diff(&original, &obj).unwrap().0.is_empty());
    }
}
