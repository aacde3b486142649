//! Mock check-in backend
//!
//! Serves the two endpoints the kiosk talks to, over an in-memory roster:
//! - `POST /checkin` `{phone_number, session_class?}` - looks the phone up and
//!   checks the membership expiry date against today
//! - `POST /sync_airtable` `{password}` - re-reads the roster file
//! - `GET /checkins` - the most recent check-in attempts, oldest first
//!
//! Every check-in attempt is printed and kept in a bounded in-memory log.
//!
//! Roster file format (JSON array):
//!   [{"id": 1, "name": "Ada", "phone_number": "5551234", "membership_expiry_date": "2030-01-31"}]
//!
//! Usage:
//!   cargo run --bin mock-checkin -- --port 5000 --members members.json --sync-password secret

use bytes::Bytes;
use chrono::{Local, NaiveDate};
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "mock-checkin")]
#[command(about = "Mock check-in backend for local kiosk testing")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// JSON roster file
    #[arg(short, long)]
    members: Option<PathBuf>,

    /// Password accepted by /sync_airtable (falls back to SYNC_PASSWORD)
    #[arg(long)]
    sync_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Member {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    phone_number: String,
    #[serde(default)]
    membership_expiry_date: Option<String>,
}

/// Attempts kept for `GET /checkins`; older ones are dropped
const MAX_LOG_ENTRIES: usize = 1000;

/// One row of the attempt log
#[derive(Debug, Clone, Serialize)]
struct CheckinRecord {
    phone_number_scanned: String,
    member_name: String,
    status: &'static str,
    member_id: Option<u64>,
    session_class: Option<String>,
}

/// Lookup result for one scan
#[derive(Debug, Clone, PartialEq, Eq)]
struct Verdict {
    status: &'static str,
    message: String,
    screen_color: &'static str,
}

/// Decide what a scan shows, given the matching member (if any) and today's date
fn evaluate(member: Option<&Member>, today: NaiveDate) -> Verdict {
    let Some(member) = member else {
        return Verdict {
            status: "not_found",
            message: "Member not found.".to_string(),
            screen_color: "red",
        };
    };

    let name = member.name.as_deref().unwrap_or("Unknown");
    let expiry = member
        .membership_expiry_date
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"));

    match expiry {
        Some(Ok(expiry)) if today <= expiry => Verdict {
            status: "active",
            message: format!("✅ Welcome, {} — Membership active.", name),
            screen_color: "green",
        },
        Some(Ok(_)) => Verdict {
            status: "expired",
            message: format!("❌ Membership expired for {}. Please renew.", name),
            screen_color: "red",
        },
        Some(Err(_)) => Verdict {
            status: "error_server",
            message: "A server error occurred. Please check the logs.".to_string(),
            screen_color: "red",
        },
        None => Verdict {
            status: "error_no_date",
            message: format!("No expiry date found for {}.", name),
            screen_color: "red",
        },
    }
}

fn load_roster(path: Option<&PathBuf>) -> Result<HashMap<String, Member>, String> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let members: Vec<Member> = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid roster {}: {}", path.display(), e))?;
    Ok(members.into_iter().map(|m| (m.phone_number.clone(), m)).collect())
}

struct MockBackend {
    members_path: Option<PathBuf>,
    sync_password: Option<String>,
    roster: Mutex<HashMap<String, Member>>,
    log: Mutex<VecDeque<CheckinRecord>>,
}

impl MockBackend {
    fn new(
        members_path: Option<PathBuf>,
        sync_password: Option<String>,
        roster: HashMap<String, Member>,
    ) -> Self {
        Self {
            members_path,
            sync_password,
            roster: Mutex::new(roster),
            log: Mutex::new(VecDeque::new()),
        }
    }

    async fn checkin(&self, body: &serde_json::Value) -> (StatusCode, serde_json::Value) {
        let phone = body.get("phone_number").and_then(|v| v.as_str()).unwrap_or("");
        if phone.is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                json!({"status": "error", "message": "Phone number missing"}),
            );
        }
        let session_class = body.get("session_class").and_then(|v| v.as_str()).map(str::to_string);

        let roster = self.roster.lock().await;
        let member = roster.get(phone);
        let verdict = evaluate(member, Local::now().date_naive());

        let record = CheckinRecord {
            phone_number_scanned: phone.to_string(),
            member_name: member
                .map(|m| m.name.clone().unwrap_or_else(|| "Unknown".to_string()))
                .unwrap_or_else(|| "Unknown Member".to_string()),
            status: verdict.status,
            member_id: member.and_then(|m| m.id),
            session_class,
        };
        drop(roster);

        println!(
            "[MOCK] Check-in {} ({}, id={:?}) session={} -> {}",
            record.phone_number_scanned,
            record.member_name,
            record.member_id,
            record.session_class.as_deref().unwrap_or("-"),
            record.status
        );
        let mut log = self.log.lock().await;
        if log.len() == MAX_LOG_ENTRIES {
            log.pop_front();
        }
        log.push_back(record);

        (
            StatusCode::OK,
            json!({
                "status": verdict.status,
                "message": verdict.message,
                "screen_color": verdict.screen_color,
            }),
        )
    }

    async fn checkins(&self) -> (StatusCode, serde_json::Value) {
        let log = self.log.lock().await;
        match serde_json::to_value(&*log) {
            Ok(records) => (StatusCode::OK, records),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"status": "error", "message": e.to_string()}),
            ),
        }
    }

    async fn sync(&self, body: &serde_json::Value) -> (StatusCode, serde_json::Value) {
        let password = body.get("password").and_then(|v| v.as_str());
        if password.is_none() || password != self.sync_password.as_deref() {
            println!("[MOCK] Sync rejected: bad password");
            return (
                StatusCode::UNAUTHORIZED,
                json!({"status": "error", "message": "Unauthorized"}),
            );
        }

        match load_roster(self.members_path.as_ref()) {
            Ok(members) if members.is_empty() => {
                println!("[MOCK] Sync: roster empty");
                (
                    StatusCode::OK,
                    json!({"status": "success", "message": "No members found to sync."}),
                )
            }
            Ok(members) => {
                let count = members.len();
                *self.roster.lock().await = members;
                println!("[MOCK] Sync: {} members loaded", count);
                (
                    StatusCode::OK,
                    json!({
                        "status": "success",
                        "message": format!("Successfully synced {} members.", count),
                    }),
                )
            }
            Err(e) => {
                eprintln!("[MOCK] Sync failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({"status": "error", "message": e}))
            }
        }
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    backend: Arc<MockBackend>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            eprintln!("[MOCK] Failed to read body: {}", e);
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                json!({"status": "error", "message": "Unreadable body"}),
            ));
        }
    };
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);

    let (status, body) = match (method, path.as_str()) {
        (Method::POST, "/checkin") => backend.checkin(&json).await,
        (Method::POST, "/sync_airtable") => backend.sync(&json).await,
        (Method::GET, "/checkins") => backend.checkins().await,
        _ => (StatusCode::NOT_FOUND, json!({"status": "error", "message": "Not Found"})),
    };
    Ok(json_response(status, body))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let sync_password = args.sync_password.or_else(|| std::env::var("SYNC_PASSWORD").ok());

    let roster = load_roster(args.members.as_ref())?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║              Mock Check-in Backend                       ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Port:            {:>5}                                   ║", args.port);
    println!("║ Members:         {:>5}                                   ║", roster.len());
    println!(
        "║ Sync password:   {:<38} ║",
        if sync_password.is_some() { "set" } else { "unset (sync always rejected)" }
    );
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let backend = Arc::new(MockBackend::new(args.members, sync_password, roster));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    println!("[MOCK] Listening on port {}", args.port);

    loop {
        let (stream, _peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let backend = backend.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, backend.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("[MOCK] Connection error: {}", e);
            }
        });
    }
}
