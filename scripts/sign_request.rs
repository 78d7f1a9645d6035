// Sign a request body the way Slack does, for poking a local server with curl
// Run: cargo run --bin sign_request -- payload.json [timestamp]

use slackgate::{compute_signature, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("Usage: sign_request <body-file> [timestamp]");
        std::process::exit(2);
    };

    let timestamp = args.next().unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before 1970")
            .as_secs()
            .to_string()
    });

    let secret = std::env::var("SLACK_SIGNING_SECRET").expect("SLACK_SIGNING_SECRET");
    let body = std::fs::read(&path).expect("read body file");

    let signature = compute_signature(secret.as_bytes(), &timestamp, &body);

    println!("{}: {}", TIMESTAMP_HEADER, timestamp);
    println!("{}: {}", SIGNATURE_HEADER, signature);
    println!();
    println!("curl -X POST http://localhost:3000/slack/events \\");
    println!("  -H 'Content-Type: application/json' \\");
    println!("  -H '{}: {}' \\", TIMESTAMP_HEADER, timestamp);
    println!("  -H '{}: {}' \\", SIGNATURE_HEADER, signature);
    println!("  --data-binary @{}", path);
}
