//! Types for receiving and answering `AdmissionReview` requests.
//!
//! See:
//! <https://kubernetes.io/docs/reference/access-authn-authz/admission-controllers/>
//! <https://github.com/kubernetes/api/blob/master/admission/v1/types.go>

use crate::{
    gvk::{GroupVersionKind, GroupVersionResource},
    response::{reason, Status},
};

use k8s_openapi::{api::authentication::v1::UserInfo, ByteString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to serialize patch")]
/// Failed to serialize patch.
pub struct SerializePatchError(#[source] serde_json::Error);

#[derive(Debug, Error)]
#[error("review contained no request")]
/// Failed to convert `AdmissionReview` into `AdmissionRequest`.
pub struct ConvertAdmissionReviewError;

/// Failed to decode a request payload into the admitter's object type.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload required by the operation was not present.
    #[error("{0:?} request carried no {1} object")]
    MissingObject(Operation, &'static str),

    /// The payload did not deserialize into the expected type.
    #[error("failed to decode object from request: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// The `kind` field of serialized reviews.
pub const META_KIND: &str = "AdmissionReview";
/// The `apiVersion` field of serialized v1 reviews.
pub const META_API_VERSION_V1: &str = "admission.k8s.io/v1";

/// Type information flattened into every review.
#[derive(Deserialize, Serialize, Clone, Default, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// The version of the API
    pub api_version: String,
    /// The name of the API
    pub kind: String,
}

impl TypeMeta {
    fn v1() -> Self {
        Self {
            api_version: META_API_VERSION_V1.to_string(),
            kind: META_KIND.to_string(),
        }
    }
}

/// The top level struct used for serializing and deserializing
/// `AdmissionReview` requests and responses.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    /// Contains the API version and type of the review.
    #[serde(flatten)]
    pub types: TypeMeta,
    /// Describes the attributes for the admission request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Describes the attributes for the admission response.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub response: Option<AdmissionResponse>,
}

impl TryFrom<AdmissionReview> for AdmissionRequest {
    type Error = ConvertAdmissionReviewError;

    fn try_from(review: AdmissionReview) -> Result<Self, Self::Error> {
        match review.request {
            Some(mut req) => {
                req.types = review.types;
                Ok(req)
            }
            None => Err(ConvertAdmissionReviewError),
        }
    }
}

/// An incoming admission request.
///
/// Object payloads are kept as raw JSON; each admitter decodes them into its
/// own type with [`AdmissionRequest::decode`] (or the `decode_new`/`decode_old`
/// shortcuts), so one dispatcher serves every registered resource.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Copied from the containing review and echoed on the response.
    #[serde(skip)]
    pub types: TypeMeta,
    /// Identifier correlating this request/response round trip.
    pub uid: String,
    /// The fully-qualified type of object being submitted.
    pub kind: GroupVersionKind,
    /// The fully-qualified resource being requested.
    pub resource: GroupVersionResource,
    /// The subresource being requested, if any (for example "status" or "scale").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    /// The name of the object. Empty on CREATE when the client relies on
    /// server-side generation.
    #[serde(default)]
    pub name: String,
    /// The namespace associated with the request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// The operation being performed.
    pub operation: Operation,
    /// Information about the requesting user.
    pub user_info: UserInfo,
    /// The object from the incoming request. `None` for DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
    /// The existing object. Populated for DELETE and UPDATE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<serde_json::Value>,
    /// Set when modifications will definitely not be persisted.
    #[serde(default)]
    pub dry_run: bool,
    /// The operation options, e.g. `meta.k8s.io/v1.DeleteOptions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// Old and new objects decoded from an [`AdmissionRequest`] by operation kind.
#[derive(Debug, Default)]
pub struct DecodedObjects<T> {
    /// The incoming object; present on CREATE and UPDATE.
    pub new: Option<T>,
    /// The stored object; present on UPDATE and DELETE.
    pub old: Option<T>,
}

impl AdmissionRequest {
    /// Decode the payloads relevant to this request's operation.
    ///
    /// CREATE carries only `object`, DELETE only `oldObject` (populated by
    /// apiservers since 1.15), UPDATE both. CONNECT carries the connect
    /// options as `object` and is decoded like CREATE.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<DecodedObjects<T>, DecodeError> {
        let new = match self.operation {
            Operation::Create | Operation::Update | Operation::Connect => self
                .object
                .as_ref()
                .map(|raw| serde_json::from_value(raw.clone()))
                .transpose()?,
            Operation::Delete => None,
        };
        let old = match self.operation {
            Operation::Update | Operation::Delete => self
                .old_object
                .as_ref()
                .map(|raw| serde_json::from_value(raw.clone()))
                .transpose()?,
            Operation::Create | Operation::Connect => None,
        };
        Ok(DecodedObjects { new, old })
    }

    /// Decode the incoming object, erroring when the operation requires one
    /// and it is absent.
    pub fn decode_new<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        self.decode()?
            .new
            .ok_or(DecodeError::MissingObject(self.operation.clone(), "new"))
    }

    /// Decode the stored object, erroring when the operation requires one and
    /// it is absent.
    pub fn decode_old<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        self.decode()?
            .old
            .ok_or(DecodeError::MissingObject(self.operation.clone(), "old"))
    }

    /// Decode the operation options (e.g. `DeleteOptions`), if present.
    pub fn decode_options<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        Ok(self
            .options
            .as_ref()
            .map(|raw| serde_json::from_value(raw.clone()))
            .transpose()?)
    }

    /// The namespace of the request, defaulting to the empty cluster scope.
    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }
}

/// The operation specified in an [`AdmissionRequest`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// An operation that creates a resource.
    Create,
    /// An operation that updates a resource.
    Update,
    /// An operation that deletes a resource.
    Delete,
    /// An operation that connects to a resource.
    Connect,
}

/// An outgoing admission response. Constructed from the corresponding
/// [`AdmissionRequest`] via [`From`], then refined with the rejection or
/// patch constructors.
///
/// Exactly one of "allowed" and "rejected with a result" holds: the
/// constructors keep `result` unset while `allowed` is true, and every
/// rejection constructor fills it in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Copied from the constructing [`AdmissionRequest`].
    #[serde(skip)]
    pub types: TypeMeta,
    /// Identifier copied over from the corresponding request.
    pub uid: String,
    /// Whether the admission request was permitted.
    pub allowed: bool,
    /// Details on why the request was denied. Not consulted when `allowed`.
    #[serde(rename = "status", skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub result: Option<Status>,
    /// An RFC 6902 patch body, base64-encoded on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub patch: Option<ByteString>,
    /// The type of `patch`; always `JSONPatch` when a patch is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    patch_type: Option<PatchType>,
}

impl From<&AdmissionRequest> for AdmissionResponse {
    fn from(req: &AdmissionRequest) -> Self {
        Self {
            types: req.types.clone(),
            uid: req.uid.clone(),
            allowed: true,
            result: None,
            patch: None,
            patch_type: None,
        }
    }
}

impl AdmissionResponse {
    /// A response for reviews whose request could not be read. Does not carry
    /// a request uid, so only use it when the original request is unusable.
    pub fn invalid_review<T: ToString>(message: T) -> Self {
        Self {
            types: TypeMeta::v1(),
            uid: Default::default(),
            allowed: false,
            result: Some(Status::failure(
                &message.to_string(),
                reason::BAD_REQUEST,
                400,
            )),
            patch: None,
            patch_type: None,
        }
    }

    /// Reject with an explicit status code and reason.
    #[must_use]
    pub fn failure<T: ToString>(mut self, message: T, failure_reason: &str, code: u16) -> Self {
        self.allowed = false;
        self.result = Some(Status::failure(&message.to_string(), failure_reason, code));
        self.patch = None;
        self.patch_type = None;
        self
    }

    /// Reject as forbidden (403).
    #[must_use]
    pub fn deny<T: ToString>(self, message: T) -> Self {
        self.failure(message, reason::FORBIDDEN, 403)
    }

    /// Reject a field-level validation failure (422).
    #[must_use]
    pub fn invalid<T: ToString>(self, message: T) -> Self {
        self.failure(message, reason::INVALID, 422)
    }

    /// Reject a malformed request (400).
    #[must_use]
    pub fn bad_request<T: ToString>(self, message: T) -> Self {
        self.failure(message, reason::BAD_REQUEST, 400)
    }

    /// Reject a clash with existing state (409).
    #[must_use]
    pub fn conflict<T: ToString>(self, message: T) -> Self {
        self.failure(message, reason::CONFLICT, 409)
    }

    /// Reject a change to a field the requester holds no authority over (403).
    #[must_use]
    pub fn unauthorized<T: ToString>(self, message: T) -> Self {
        self.failure(message, reason::UNAUTHORIZED, 403)
    }

    /// Attach a JSON patch, modifying the object from the request.
    ///
    /// An empty patch is dropped so that no-op mutators answer with a plain
    /// allow.
    pub fn with_patch(mut self, patch: json_patch::Patch) -> Result<Self, SerializePatchError> {
        if patch.0.is_empty() {
            return Ok(self);
        }
        self.patch = Some(ByteString(
            serde_json::to_vec(&patch).map_err(SerializePatchError)?,
        ));
        self.patch_type = Some(PatchType::JsonPatch);
        Ok(self)
    }

    /// Whether a patch is attached.
    pub fn has_patch(&self) -> bool {
        self.patch.is_some()
    }

    /// Wrap into a review suitable as a webhook response body.
    pub fn into_review(self) -> AdmissionReview {
        AdmissionReview {
            types: if self.types.kind.is_empty() {
                TypeMeta::v1()
            } else {
                self.types.clone()
            },
            request: None,
            response: Some(self),
        }
    }
}

/// The type of patch returned in an [`AdmissionResponse`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum PatchType {
    /// The patch body implements JSON Patch under RFC 6902.
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}
