//! In-process registry stub and layer fixtures shared by integration tests

#![allow(dead_code)]

use docker_image_runner::config::RegistryConfig;
use docker_image_runner::image::{DigestUtils, DOCKER_MANIFEST_V2};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub accept: Option<String>,
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    body: Vec<u8>,
}

/// Minimal HTTP/1.1 server answering GET requests from a fixed route table.
/// Unknown paths get 404.
pub struct MockRegistry {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct MockRegistryBuilder {
    routes: HashMap<String, Reply>,
}

impl MockRegistryBuilder {
    pub fn route(mut self, path: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(
            path.to_string(),
            Reply {
                status,
                body: body.into(),
            },
        );
        self
    }

    pub fn token(self, token: &str) -> Self {
        self.route("/token", 200, format!(r#"{{"token":"{}"}}"#, token))
    }

    pub fn manifest(self, name: &str, tag: &str, layers: &[Vec<u8>]) -> Self {
        let path = format!("/v2/library/{}/manifests/{}", name, tag);
        self.route(&path, 200, manifest_json(layers))
    }

    pub fn blobs(mut self, name: &str, layers: &[Vec<u8>]) -> Self {
        for layer in layers {
            let path = blob_path(name, &DigestUtils::compute_docker_digest(layer));
            self = self.route(&path, 200, layer.clone());
        }
        self
    }

    pub async fn start(self) -> MockRegistry {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(self.routes);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    serve(stream, &routes, &recorded).await;
                });
            }
        });

        MockRegistry {
            base_url: format!("http://{}", addr),
            requests,
            handle,
        }
    }
}

impl MockRegistry {
    pub fn builder() -> MockRegistryBuilder {
        MockRegistryBuilder::default()
    }

    pub fn config(&self) -> RegistryConfig {
        RegistryConfig::for_registry(&self.base_url).unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

impl Drop for MockRegistry {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: &HashMap<String, Reply>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.split("\r\n");
    let target = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.clone(), None),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    recorded.lock().unwrap().push(RecordedRequest {
        path: path.clone(),
        query,
        authorization: headers.get("authorization").cloned(),
        accept: headers.get("accept").cloned(),
    });

    let reply = routes.get(&path).cloned().unwrap_or(Reply {
        status: 404,
        body: b"not found".to_vec(),
    });
    let header = format!(
        "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        reply.status,
        reply.body.len()
    );
    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(&reply.body).await;
    let _ = stream.shutdown().await;
}

pub fn blob_path(name: &str, digest: &str) -> String {
    format!("/v2/library/{}/blobs/{}", name, digest)
}

pub fn manifest_json(layers: &[Vec<u8>]) -> String {
    let descriptors: Vec<serde_json::Value> = layers
        .iter()
        .map(|layer| {
            serde_json::json!({
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": layer.len(),
                "digest": DigestUtils::compute_docker_digest(layer),
            })
        })
        .collect();

    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": DOCKER_MANIFEST_V2,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": 0,
            "digest": "sha256:0000000000000000000000000000000000000000000000000000000000000000",
        },
        "layers": descriptors,
    })
    .to_string()
}

/// Gzipped tar of regular files: (path, content, mode)
pub fn layer(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
