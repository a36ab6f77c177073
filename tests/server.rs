//! HTTP API tests against a running `docqa serve` process.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const VOCAB: &[&str] = &["rust", "cargo", "python", "pytorch", "vacation"];

fn docqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("docqa");
    path
}

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCAB
        .iter()
        .map(|word| lower.matches(word).count() as f32)
        .collect();
    v.push(0.1);
    v
}

async fn start_embedding_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(|req: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let embeddings: Vec<Vec<f32>> = body["input"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| keyword_vector(t.as_str().unwrap()))
                .collect();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "embeddings": embeddings }))
        })
        .mount(&server)
        .await;
    server
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Kills the server process when the test ends, pass or fail.
struct ServerGuard {
    child: Child,
    port: u16,
    _tmp: TempDir,
    upload_dir: PathBuf,
}

impl ServerGuard {
    fn url(&self, route: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, route)
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn write_config(root: &Path, embed_url: &str, llm_url: &str) -> PathBuf {
    fs::create_dir_all(root.join("config")).unwrap();
    let config_content = format!(
        r#"[db]
path = "{root}/data/docqa.sqlite"

[storage]
upload_dir = "{root}/data/uploads"

[retrieval]
top_k = 5
max_k = 10

[embedding]
provider = "ollama"
model = "keyword-test"
dims = {dims}
url = "{embed_url}"
max_retries = 0

[llm]
max_retries = 0

[llm.groq]
api_key = "gsk-test"
base_url = "{llm_url}"

[llm.gemini]
api_key_env = "DOCQA_TEST_GEMINI_KEY_UNSET"
"#,
        root = root.display(),
        dims = VOCAB.len() + 1,
        embed_url = embed_url,
        llm_url = llm_url,
    );
    let config_path = root.join("config").join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

async fn start_server(embed_url: &str, llm_url: &str) -> ServerGuard {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), embed_url, llm_url);
    let port = find_free_port();

    let child = Command::new(docqa_binary())
        .arg("--config")
        .arg(&config_path)
        .args(["serve", "--bind", &format!("127.0.0.1:{}", port)])
        .env_remove("GEMINI_API_KEY")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn docqa serve");

    let guard = ServerGuard {
        child,
        port,
        upload_dir: tmp.path().join("data/uploads/documents"),
        _tmp: tmp,
    };
    wait_for_server(port).await;
    guard
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn upload(
    client: &reqwest::Client,
    server: &ServerGuard,
    name: &str,
    text: &str,
) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(text.as_bytes().to_vec()).file_name(name.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    client
        .post(server.url("/upload/"))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: &str,
) -> (reqwest::StatusCode, serde_json::Value) {
    let resp = client
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let server = start_server("http://127.0.0.1:1", "http://127.0.0.1:1").await;
    let body: serde_json::Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_without_file_is_bad_request() {
    let server = start_server("http://127.0.0.1:1", "http://127.0.0.1:1").await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let resp = client
        .post(server.url("/upload/"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "No file provided" }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_list_get_delete() {
    let embed = start_embedding_server().await;
    let server = start_server(&embed.uri(), "http://127.0.0.1:1").await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &server, "guide.txt", "Rust and Cargo basics.").await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["id"], 1);
    assert_eq!(body["name"], "guide.txt");
    assert_eq!(body["chunks"], 1);
    assert_eq!(body["message"], "Successfully processed document with 1 chunks");

    let list: serde_json::Value = client
        .get(server.url("/documents/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let docs = list["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["name"], "guide.txt");
    assert!(docs[0]["file"].as_str().unwrap().starts_with("documents/"));
    assert!(docs[0]["created_at"].is_string());

    let detail: serde_json::Value = client
        .get(server.url("/documents/1/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["chunks"][0]["text"], "Rust and Cargo basics.");
    assert_eq!(detail["chunks"][0]["order"], 0);

    let resp = client
        .delete(server.url("/documents/1/delete/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "ok": true }));
    assert_eq!(fs::read_dir(&server.upload_dir).unwrap().count(), 0);

    let resp = client
        .delete(server.url("/documents/1/delete/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Not found" }));

    let resp = client.get(server.url("/documents/1/")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_blank_file_is_bad_request() {
    let embed = start_embedding_server().await;
    let server = start_server(&embed.uri(), "http://127.0.0.1:1").await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &server, "blank.txt", "  \n ").await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Could not extract text from file. File may be empty or corrupted."
    );

    let list: serde_json::Value = client
        .get(server.url("/documents/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list["documents"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_validation() {
    let server = start_server("http://127.0.0.1:1", "http://127.0.0.1:1").await;
    let client = reqwest::Client::new();
    let chat = server.url("/chat/");

    let (status, body) = post_json(&client, &chat, "{not json").await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON: "));

    let (status, body) = post_json(&client, &chat, r#"{"message": "   "}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Empty message");

    let (status, _) = post_json(&client, &chat, r#"{"message": "hi", "k": 0}"#).await;
    assert_eq!(status, 400);

    let (status, body) = post_json(&client, &chat, r#"{"message": "hi"}"#).await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        serde_json::json!({
            "answer": "No documents have been uploaded yet. Please upload a document first to ask questions about it.",
            "sources": []
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_answers_from_selected_documents() {
    let embed = start_embedding_server().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("PyTorch trains models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "It trains models." } }]
        })))
        .mount(&llm)
        .await;

    let server = start_server(&embed.uri(), &llm.uri()).await;
    let client = reqwest::Client::new();
    upload(&client, &server, "rust.txt", "Rust uses Cargo. Cargo builds crates.").await;
    upload(&client, &server, "py.txt", "Python with PyTorch. PyTorch trains models.").await;

    let (status, body) = post_json(
        &client,
        &server.url("/chat/"),
        r#"{"message": "What does pytorch do?", "provider": "GROQ", "k": 1}"#,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["answer"], "It trains models.");
    assert_eq!(body["chunks_searched"], 2);
    assert_eq!(body["chunks_used"], 1);
    assert_eq!(body["sources"][0]["document_id"], 2);
    assert_eq!(body["sources"][0]["order"], 0);
    assert!(body["sources"][0]["score"].as_f64().unwrap() > 0.5);

    // Restricted to the Rust document, only its chunk is searched
    let (status, body) = post_json(
        &client,
        &server.url("/chat/"),
        r#"{"message": "What does pytorch do?", "document_ids": [1], "provider": "gemini"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["chunks_searched"], 1);
    assert_eq!(body["sources"][0]["document_id"], 1);
    assert_eq!(body["answer"], "Gemini API key not configured.");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_search_endpoint() {
    let embed = start_embedding_server().await;
    let server = start_server(&embed.uri(), "http://127.0.0.1:1").await;
    let client = reqwest::Client::new();
    upload(&client, &server, "rust.txt", "Rust uses Cargo.").await;
    upload(&client, &server, "vacation.txt", "Vacation policy: 25 vacation days.").await;

    let (status, body) = post_json(
        &client,
        &server.url("/search/"),
        r#"{"query": "how many vacation days", "k": 50}"#,
    )
    .await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();
    // k is clamped to max_k, then to the number of chunks
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["document_id"], 2);
    assert!(results[0]["score"].as_f64().unwrap() >= results[1]["score"].as_f64().unwrap());

    let (status, body) = post_json(&client, &server.url("/search/"), r#"{"query": ""}"#).await;
    assert_eq!(status, 400);
    assert!(body["error"].is_string());
}
