// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! This module contains the wrapped functions of the AWS S3 service the sink
//! writes through.

use crate::config::PLOVER_S3_CLIENT;
use crate::error::{PloverError, Result};
use rusoto_core::ByteStream;
use rusoto_s3::{
    Delete, DeleteObjectsRequest, ListObjectsV2Request, ObjectIdentifier, PutObjectRequest, S3,
};

/// Splits an `s3://bucket/prefix` target into bucket and prefix. Returns
/// `None` for local filesystem targets.
pub fn parse_s3_path(target: &str) -> Option<(String, String)> {
    let rest = target.strip_prefix("s3://")?;
    match rest.split_once('/') {
        Some((bucket, prefix)) => Some((bucket.to_string(), prefix.trim_matches('/').to_string())),
        None => Some((rest.to_string(), String::new())),
    }
}

/// Puts an object to AWS S3. If the object exists, it is overwritten.
///
/// # Arguments
/// * `bucket` - The name of the bucket to put the object in.
/// * `key` - The key of the object to put.
/// * `body` - The body of the object to put.
pub async fn put_object(bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
    PLOVER_S3_CLIENT
        .put_object(PutObjectRequest {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            body: Some(ByteStream::from(body)),
            ..Default::default()
        })
        .await
        .map_err(|e| PloverError::Write(e.to_string()))
        .map(|_| ())
}

/// Deletes every object under a key prefix. Used by the partition-replace
/// write policy to clear a partition before rewriting it.
pub async fn delete_prefix(bucket: &str, prefix: &str) -> Result<()> {
    loop {
        let listing = PLOVER_S3_CLIENT
            .list_objects_v2(ListObjectsV2Request {
                bucket: bucket.to_owned(),
                prefix: Some(prefix.to_owned()),
                ..Default::default()
            })
            .await
            .map_err(|e| PloverError::Write(e.to_string()))?;

        let objects: Vec<ObjectIdentifier> = listing
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|o| o.key)
            .map(|key| ObjectIdentifier {
                key,
                ..Default::default()
            })
            .collect();
        if objects.is_empty() {
            return Ok(());
        }

        PLOVER_S3_CLIENT
            .delete_objects(DeleteObjectsRequest {
                bucket: bucket.to_owned(),
                delete: Delete {
                    objects,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .map_err(|e| PloverError::Write(e.to_string()))?;

        if listing.is_truncated != Some(true) {
            return Ok(());
        }
    }
}
