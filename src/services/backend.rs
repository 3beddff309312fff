//! Client side of the transfer backend's GraphQL API.

use crate::{
    errors::{UploadError, UploadResult},
    models::{
        multipart::{
            CompleteMultipartRequest, MultipartCompletion, MultipartStart, StartMultipartRequest,
        },
        transfer::{CreatedTransfer, TransferOptions},
    },
};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::future::Future;
use tracing::debug;

const START_MULTIPART_UPLOAD: &str = r#"
mutation StartMultipartUpload(
  $transferId: String!
  $fileId: String!
  $fileName: String!
  $fileSize: Float!
  $mimeType: String
  $totalParts: Int!
) {
  startMultipartUpload(
    transferId: $transferId
    fileId: $fileId
    fileName: $fileName
    fileSize: $fileSize
    mimeType: $mimeType
    totalParts: $totalParts
  ) {
    uploadId
    key
    presignedUrls {
      partNumber
      uploadUrl
    }
  }
}"#;

const COMPLETE_MULTIPART_UPLOAD: &str = r#"
mutation CompleteMultipartUpload(
  $uploadId: String!
  $key: String!
  $parts: [PartInput!]!
  $transferId: String
  $fileId: String!
) {
  completeMultipartUpload(
    uploadId: $uploadId
    key: $key
    parts: $parts
    transferId: $transferId
    fileId: $fileId
  ) {
    success
    key
    url
    size
    etag
    fileId
  }
}"#;

const CREATE_FILE_TRANSFER_WITH_IDS: &str = r#"
mutation CreateFileTransferWithIdsR2($fileIds: [String!]!, $input: FileTransferInput) {
  createFileTransferWithIdsR2(fileIds: $fileIds, input: $input) {
    fileTransfer {
      id
      files {
        originalName
        displayName
        fileName
        filePath
        r2Key
        mimeType
        size
        storageType
        fileId
      }
      totalSize
      shareLink
      accessKey
      expiryDate
      isPaymentRequired
      paymentAmount
      paymentCurrency
      status
      createdAt
    }
    shareLink
    accessKey
  }
}"#;

/// Operations the upload pipeline needs from the backend.
pub trait TransferBackend: Send + Sync {
    /// Open a multipart upload and obtain one presigned URL per part.
    fn start_multipart_upload(
        &self,
        request: &StartMultipartRequest,
    ) -> impl Future<Output = UploadResult<MultipartStart>> + Send;

    /// Assemble the uploaded parts into the final object.
    fn complete_multipart_upload(
        &self,
        request: &CompleteMultipartRequest,
    ) -> impl Future<Output = UploadResult<MultipartCompletion>> + Send;

    /// Create the share-link transfer record for already uploaded files.
    fn create_file_transfer(
        &self,
        file_ids: &[String],
        options: &TransferOptions,
    ) -> impl Future<Output = UploadResult<CreatedTransfer>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest<'a, V> {
    operation_name: &'a str,
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// [`TransferBackend`] over HTTP, posting GraphQL documents to one endpoint.
#[derive(Clone)]
pub struct GraphqlBackend {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl GraphqlBackend {
    pub fn new(client: Client, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one mutation and decode the payload found under `field`.
    async fn execute<V, T>(
        &self,
        operation_name: &str,
        field: &'static str,
        query: &str,
        variables: V,
    ) -> UploadResult<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::ACCEPT, "application/json")
            .json(&GraphQlRequest {
                operation_name,
                query,
                variables,
            });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|source| UploadError::Backend {
            operation: field,
            source,
        })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|source| UploadError::Backend {
            operation: field,
            source,
        })?;
        debug!("{} answered {} ({} bytes)", field, status, body.len());

        let parsed: GraphQlResponse =
            serde_json::from_str(&body).map_err(|err| UploadError::InvalidResponse {
                operation: field,
                reason: format!("status {}: {}", status, err),
            })?;

        if !parsed.errors.is_empty() {
            return Err(UploadError::GraphQl {
                operation: field,
                messages: parsed.errors.into_iter().map(|e| e.message).collect(),
            });
        }
        if !status.is_success() {
            return Err(UploadError::InvalidResponse {
                operation: field,
                reason: format!("status {}", status),
            });
        }

        let payload = parsed
            .data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .filter(|value| !value.is_null())
            .ok_or_else(|| UploadError::InvalidResponse {
                operation: field,
                reason: "missing data".into(),
            })?;

        serde_json::from_value(payload).map_err(|err| UploadError::InvalidResponse {
            operation: field,
            reason: err.to_string(),
        })
    }
}

impl TransferBackend for GraphqlBackend {
    async fn start_multipart_upload(
        &self,
        request: &StartMultipartRequest,
    ) -> UploadResult<MultipartStart> {
        self.execute(
            "StartMultipartUpload",
            "startMultipartUpload",
            START_MULTIPART_UPLOAD,
            request,
        )
        .await
    }

    async fn complete_multipart_upload(
        &self,
        request: &CompleteMultipartRequest,
    ) -> UploadResult<MultipartCompletion> {
        self.execute(
            "CompleteMultipartUpload",
            "completeMultipartUpload",
            COMPLETE_MULTIPART_UPLOAD,
            request,
        )
        .await
    }

    async fn create_file_transfer(
        &self,
        file_ids: &[String],
        options: &TransferOptions,
    ) -> UploadResult<CreatedTransfer> {
        self.execute(
            "CreateFileTransferWithIdsR2",
            "createFileTransferWithIdsR2",
            CREATE_FILE_TRANSFER_WITH_IDS,
            json!({ "fileIds": file_ids, "input": options }),
        )
        .await
    }
}
