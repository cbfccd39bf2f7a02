use std::io::{self, Write};

use clap::Parser;
use feedgate::model::Resolution;
use feedgate::parser::{self, Command};
use serde_json::{json, Value};

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "feedgate operator console", long_about = None)]
struct Args {
    #[clap(long, env = "FEEDGATE_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,
}

struct Session {
    server: String,
    client: reqwest::Client,
    token: Option<String>,
    resolution: String,
}

impl Session {
    fn new(server: String) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            token: None,
            resolution: Resolution::R720x960.to_string(),
        }
    }

    fn token(&self) -> Result<&str, String> {
        self.token.as_deref().ok_or_else(|| "No token set. Use TOKEN '<token>' first.".to_string())
    }

    async fn get(&self, route: &str, extra: &[(&str, String)], at: Option<i64>) -> Result<Value, String> {
        let mut query: Vec<(&str, String)> = vec![
            ("accessToken", self.token()?.to_string()),
            ("resolution", self.resolution.clone()),
            ("lastActionTime", at.unwrap_or(0).to_string()),
        ];
        query.extend(extra.iter().cloned());

        let resp = self
            .client
            .get(format!("{}/{}", self.server, route))
            .query(&query)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        resp.json::<Value>().await.map_err(|e| e.to_string())
    }

    async fn post(&self, route: &str, mut body: Value, at: Option<i64>) -> Result<Value, String> {
        body["accessToken"] = json!(self.token()?);
        body["resolution"] = json!(self.resolution);
        body["lastActionTime"] = json!(at.unwrap_or(0));

        let resp = self
            .client
            .post(format!("{}/{}", self.server, route))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        resp.json::<Value>().await.map_err(|e| e.to_string())
    }
}

fn main() {
    let args = Args::parse();
    print_banner();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to start runtime");

    let mut session = Session::new(args.server);
    match runtime.block_on(session.client.get(format!("{}/health", session.server)).send()) {
        Ok(_) => println!("[\u{2713}] Connected to feedgate at {}!", session.server),
        Err(_) => {
            println!("[\u{2717}] Could not reach server at {}.", session.server);
            println!("    Make sure to run 'feedgate' in another terminal.");
            return;
        }
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("feedgate> ");
        if io::stdout().flush().is_err() {
            break;
        }
        buffer.clear();

        match stdin.read_line(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if buffer.trim().is_empty() {
            continue;
        }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = runtime.block_on(execute_command(&mut session, cmd)) {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.to_uppercase().starts_with("CHAT") {
                    println!("    \u{2139}\u{fe0f}  Hint: Quote the user id: CHAT 'user-id' AT 100");
                }
            }
        }
    }
}

fn print_banner() {
    println!("\n==================================================");
    println!("   feedgate console - feed aggregation gateway");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. SESSION:   TOKEN '<accessToken>'   |   RES 720x960");
    println!("2. NEW FACES: NEWFACES [AT <lastActionTime>] [LIMIT <n>]");
    println!("3. DISCOVER:  DISCOVER [AT <n>] [LIMIT <n>] [AGE 21-35] [DIST 5000]");
    println!("4. LMM:       LMM [AT <n>]");
    println!("5. LMHIS:     LMHIS [AT <n>]");
    println!("6. LC:        LC [AT <n>] [SOURCE who_liked_me]");
    println!("7. CHAT:      CHAT '<userId>' [AT <n>]");
    println!("8. EXIT:      Quit\n");
}

async fn execute_command(session: &mut Session, cmd: Command) -> Result<(), String> {
    let response = match cmd {
        Command::Help | Command::Exit => {
            print_help();
            return Ok(());
        }
        Command::Token(token) => {
            session.token = Some(token);
            println!("[\u{2713} OK] Token set.");
            return Ok(());
        }
        Command::Resolution(res) => {
            if res.parse::<Resolution>().is_err() {
                println!("    \u{2139}\u{fe0f}  {} is not rendered; the server will fall back to 1440x1920.", res);
            }
            session.resolution = res;
            return Ok(());
        }
        Command::NewFaces { at, limit } => {
            let extra: Vec<(&str, String)> = limit.map(|l| ("limit", l.to_string())).into_iter().collect();
            session.get("new_faces", &extra, at).await?
        }
        Command::Discover { at, limit, age, distance } => {
            let mut filter = json!({});
            if let Some((min, max)) = age {
                filter["minAge"] = json!(min);
                filter["maxAge"] = json!(max);
            }
            if let Some(d) = distance {
                filter["maxDistance"] = json!(d);
            }
            let mut body = json!({ "filter": filter });
            if let Some(l) = limit {
                body["limit"] = json!(l);
            }
            session.post("discover", body, at).await?
        }
        Command::Lmm { at } => session.get("lmm", &[], at).await?,
        Command::Lmhis { at } => session.get("lmhis", &[], at).await?,
        Command::Lc { at, source } => {
            let body = json!({ "source": source.unwrap_or_else(|| "who_liked_me".to_string()) });
            session.post("lc", body, at).await?
        }
        Command::Chat { user_id, at } => session.get("chat", &[("userId", user_id)], at).await?,
    };

    print_response(&response)
}

fn print_response(response: &Value) -> Result<(), String> {
    if let Some(code) = response.get("errorCode").and_then(Value::as_str) {
        return Err(format!("{} ({})", code, response["errorMessage"].as_str().unwrap_or_default()));
    }

    let repeat = response["repeatRequestAfter"].as_i64().unwrap_or(0);
    if repeat > 0 {
        println!("[\u{23f1}\u{fe0f} Deferred] Shards are catching up, repeat after {}s", repeat);
        return Ok(());
    }

    let pretty = serde_json::to_string_pretty(response).map_err(|e| e.to_string())?;
    println!("{}\n", pretty);
    Ok(())
}
