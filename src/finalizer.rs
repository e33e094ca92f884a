//! The deletion guard on `S3Bucket` records.
//!
//! Patches always start with a `test` operation against the current finalizer list, so a
//! concurrent writer makes the patch fail instead of being overwritten.

use json_patch::{AddOperation, Patch, PatchOperation, RemoveOperation, TestOperation};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub const GUARD: &str = "s3.controlant.com/cleanup";

pub fn is_attached(meta: &ObjectMeta) -> bool {
  position(meta).is_some()
}

fn position(meta: &ObjectMeta) -> Option<usize> {
  meta.finalizers.as_ref()?.iter().position(|f| f == GUARD)
}

/// Patch adding the guard, `None` when it is already present
pub fn attach_patch(meta: &ObjectMeta) -> Option<Patch> {
  if is_attached(meta) {
    return None;
  }
  let ops = match &meta.finalizers {
    None => vec![
      PatchOperation::Test(TestOperation {
        path: "/metadata/finalizers".to_string(),
        value: serde_json::Value::Null,
      }),
      PatchOperation::Add(AddOperation {
        path: "/metadata/finalizers".to_string(),
        value: vec![GUARD].into(),
      }),
    ],
    Some(current) => vec![
      PatchOperation::Test(TestOperation {
        path: "/metadata/finalizers".to_string(),
        value: current.clone().into(),
      }),
      PatchOperation::Add(AddOperation {
        path: "/metadata/finalizers/-".to_string(),
        value: GUARD.into(),
      }),
    ],
  };
  Some(Patch(ops))
}

/// Patch removing the guard, `None` when it is already gone
pub fn release_patch(meta: &ObjectMeta) -> Option<Patch> {
  let idx = position(meta)?;
  let path = format!("/metadata/finalizers/{}", idx);
  Some(Patch(vec![
    PatchOperation::Test(TestOperation {
      path: path.clone(),
      value: GUARD.into(),
    }),
    PatchOperation::Remove(RemoveOperation { path }),
  ]))
}
