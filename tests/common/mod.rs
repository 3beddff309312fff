//! In-process stand-in for the transfer backend and presigned storage.
//!
//! `POST /graphql` answers the three mutations the uploader uses and
//! `PUT /storage/{upload_id}/{part}` accepts part bodies, answering with an
//! MD5 ETag the way S3-compatible stores do.

#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{post, put},
};
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;
use transfer_uploader::{
    GraphqlBackend, PartUploader, RetryPolicy, SelectionLimits, TransferService,
    UploadCoordinator, UploaderConfig,
};

/// How storage answers PUTs for one part number.
#[derive(Clone, Debug)]
pub enum PartBehavior {
    /// Succeed without an ETag header.
    NoEtag,
    /// Answer `status` for the next `times` attempts, then succeed.
    FailTimes { times: u32, status: u16 },
    /// Always answer 403, as for an expired signature.
    Forbidden,
    /// Succeed with an MD5-shaped ETag that does not match the body.
    WrongEtag,
}

/// How the backend answers `completeMultipartUpload`.
#[derive(Clone, Debug)]
pub enum CompleteFailure {
    /// Answer `success: false`.
    Unsuccessful,
    /// Answer with a GraphQL error carrying this message.
    GraphQl(String),
}

#[derive(Default)]
pub struct UploadRecord {
    pub key: String,
    pub file_id: String,
    pub total_parts: u32,
    pub parts: BTreeMap<u32, (Bytes, String)>,
    pub assembled: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MockState {
    pub base_url: String,
    pub uploads: HashMap<String, UploadRecord>,
    pub start_calls: Vec<Value>,
    pub complete_calls: Vec<Value>,
    pub create_calls: Vec<Value>,
    pub auth_headers: Vec<Option<String>>,
    pub put_count: usize,
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub behaviors: HashMap<u32, PartBehavior>,
    pub put_delay: Duration,
    pub start_errors: Option<Vec<String>>,
    pub drop_presigned_part: Option<u32>,
    pub complete_failure: Option<CompleteFailure>,
}

pub type Shared = Arc<Mutex<MockState>>;

pub struct MockServer {
    pub state: Shared,
    pub base_url: String,
}

impl MockServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));
        let app = Router::new()
            .route("/graphql", post(graphql))
            .route("/storage/{upload_id}/{part}", put(upload_part))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        state.lock().unwrap().base_url = base_url.clone();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state, base_url }
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base_url)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn service(&self, config: UploaderConfig) -> TransferService<GraphqlBackend> {
        self.service_with_token(config, None)
    }

    pub fn service_with_token(
        &self,
        config: UploaderConfig,
        token: Option<&str>,
    ) -> TransferService<GraphqlBackend> {
        let client = config.http_client().unwrap();
        let backend =
            GraphqlBackend::new(client.clone(), self.graphql_url(), token.map(str::to_string));
        let uploader = PartUploader::new(client, config.retry, config.verify_etags);
        TransferService::new(UploadCoordinator::new(backend, uploader, config))
    }
}

/// Small parts and fast retries so tests stay quick.
pub fn test_config(part_size: u64, max_concurrency: usize) -> UploaderConfig {
    UploaderConfig {
        part_size,
        max_concurrency,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        limits: SelectionLimits::default(),
        ..UploaderConfig::default()
    }
}

/// Write `len` bytes of a repeating pattern to `dir/name`.
pub fn write_fixture(dir: &std::path::Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

fn graphql_error(message: &str) -> Json<Value> {
    Json(json!({ "data": null, "errors": [{ "message": message }] }))
}

async fn graphql(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.auth_headers.push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let variables = body["variables"].clone();
    match body["operationName"].as_str().unwrap_or_default() {
        "StartMultipartUpload" => {
            state.start_calls.push(variables.clone());
            if let Some(messages) = state.start_errors.clone() {
                let errors: Vec<Value> =
                    messages.iter().map(|m| json!({ "message": m })).collect();
                return Json(json!({ "data": null, "errors": errors }));
            }

            let upload_id = format!("upload-{}", state.start_calls.len());
            let total_parts = variables["totalParts"].as_u64().unwrap() as u32;
            let key = format!(
                "transfers/{}/{}",
                variables["transferId"].as_str().unwrap(),
                variables["fileId"].as_str().unwrap()
            );
            let urls: Vec<Value> = (1..=total_parts)
                .filter(|n| state.drop_presigned_part != Some(*n))
                .map(|n| {
                    json!({
                        "partNumber": n,
                        "uploadUrl": format!("{}/storage/{}/{}", state.base_url, upload_id, n)
                    })
                })
                .collect();

            state.uploads.insert(
                upload_id.clone(),
                UploadRecord {
                    key: key.clone(),
                    file_id: variables["fileId"].as_str().unwrap().to_string(),
                    total_parts,
                    ..Default::default()
                },
            );

            Json(json!({
                "data": {
                    "startMultipartUpload": {
                        "uploadId": upload_id,
                        "key": key,
                        "presignedUrls": urls
                    }
                }
            }))
        }
        "CompleteMultipartUpload" => {
            state.complete_calls.push(variables.clone());
            let upload_id = variables["uploadId"].as_str().unwrap().to_string();
            match state.complete_failure.clone() {
                Some(CompleteFailure::GraphQl(message)) => return graphql_error(&message),
                Some(CompleteFailure::Unsuccessful) => {
                    return Json(json!({
                        "data": {
                            "completeMultipartUpload": {
                                "success": false,
                                "key": null,
                                "url": null,
                                "size": null,
                                "etag": null,
                                "fileId": null
                            }
                        }
                    }));
                }
                None => {}
            }
            let Some(upload) = state.uploads.get_mut(&upload_id) else {
                return graphql_error("NoSuchUpload");
            };

            let mut assembled = Vec::new();
            for part in variables["parts"].as_array().unwrap() {
                let number = part["partNumber"].as_u64().unwrap() as u32;
                let etag = part["etag"].as_str().unwrap();
                match upload.parts.get(&number) {
                    Some((bytes, stored)) if stored == etag => assembled.extend_from_slice(bytes),
                    _ => return graphql_error("InvalidPart"),
                }
            }

            let size = assembled.len();
            upload.assembled = Some(assembled);
            Json(json!({
                "data": {
                    "completeMultipartUpload": {
                        "success": true,
                        "key": upload.key,
                        "url": null,
                        "size": size,
                        "etag": null,
                        "fileId": upload.file_id
                    }
                }
            }))
        }
        "CreateFileTransferWithIdsR2" => {
            state.create_calls.push(variables.clone());
            let file_ids: Vec<String> = variables["fileIds"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect();

            let mut total = 0usize;
            let mut files = Vec::new();
            for file_id in &file_ids {
                let upload = state
                    .uploads
                    .values()
                    .find(|u| &u.file_id == file_id && u.assembled.is_some());
                let Some(upload) = upload else {
                    return graphql_error("file not uploaded");
                };
                let size = upload.assembled.as_ref().map_or(0, Vec::len);
                total += size;
                files.push(json!({
                    "fileId": file_id,
                    "r2Key": upload.key,
                    "size": size,
                    "storageType": "r2"
                }));
            }

            Json(json!({
                "data": {
                    "createFileTransferWithIdsR2": {
                        "fileTransfer": {
                            "id": "transfer-1",
                            "files": files,
                            "totalSize": total,
                            "shareLink": "share-abc",
                            "accessKey": "key-123",
                            "expiryDate": "2026-10-25T00:00:00Z",
                            "status": "ACTIVE"
                        },
                        "shareLink": "share-abc",
                        "accessKey": "key-123"
                    }
                }
            }))
        }
        other => graphql_error(&format!("unknown operation {}", other)),
    }
}

async fn upload_part(
    State(state): State<Shared>,
    Path((upload_id, part)): Path<(String, u32)>,
    body: Bytes,
) -> Response {
    let delay = {
        let mut s = state.lock().unwrap();
        s.put_count += 1;
        s.in_flight += 1;
        s.max_in_flight = s.max_in_flight.max(s.in_flight);
        s.put_delay
    };
    tokio::time::sleep(delay.max(Duration::from_millis(10))).await;

    let mut s = state.lock().unwrap();
    s.in_flight -= 1;

    let etag = format!("\"{:x}\"", md5::compute(&body));
    let mut with_etag = true;
    match s.behaviors.get(&part).cloned() {
        Some(PartBehavior::Forbidden) => {
            return (StatusCode::FORBIDDEN, "Request has expired").into_response();
        }
        Some(PartBehavior::FailTimes { times, status }) if times > 0 => {
            s.behaviors.insert(
                part,
                PartBehavior::FailTimes {
                    times: times - 1,
                    status,
                },
            );
            let status = StatusCode::from_u16(status).unwrap();
            return (status, "try again").into_response();
        }
        Some(PartBehavior::WrongEtag) => {
            let wrong = "\"00000000000000000000000000000000\"".to_string();
            return stored_response(&mut s, &upload_id, part, body, wrong);
        }
        Some(PartBehavior::NoEtag) => with_etag = false,
        _ => {}
    }

    let mut response = stored_response(&mut s, &upload_id, part, body, etag);
    if !with_etag {
        response.headers_mut().remove(header::ETAG);
    }
    response
}

fn stored_response(
    state: &mut MockState,
    upload_id: &str,
    part: u32,
    body: Bytes,
    etag: String,
) -> Response {
    let Some(upload) = state.uploads.get_mut(upload_id) else {
        return (StatusCode::NOT_FOUND, "NoSuchUpload").into_response();
    };
    upload.parts.insert(part, (body, etag.clone()));

    let mut response = StatusCode::OK.into_response();
    response
        .headers_mut()
        .insert(header::ETAG, HeaderValue::from_str(&etag).unwrap());
    response
}
