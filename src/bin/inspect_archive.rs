use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <search_query> [database_url]", args[0]);
        eprintln!("Search query matches against sender or subject of archived messages.");
        std::process::exit(1);
    }

    let search_term = format!("%{}%", args[1]);
    let database_url = args
        .get(2)
        .map(String::as_str)
        .unwrap_or("sqlite://archive.db");

    let pool = SqlitePoolOptions::new()
        .connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to archive database: {}", e))?;

    let row = sqlx::query(
        "SELECT account, original_id, from_address, to_addresses, subject, received_at, body, archived_at
         FROM archived_messages
         WHERE from_address LIKE ? OR subject LIKE ?
         ORDER BY archived_at DESC
         LIMIT 1",
    )
    .bind(&search_term)
    .bind(&search_term)
    .fetch_optional(&pool)
    .await?;

    if let Some(row) = row {
        let account: String = row.get("account");
        let original_id: String = row.get("original_id");
        let from: Option<String> = row.get("from_address");
        let to: Option<String> = row.get("to_addresses");
        let subject: Option<String> = row.get("subject");
        let received_at: Option<String> = row.get("received_at");
        let body: Option<String> = row.get("body");
        let archived_at: String = row.get("archived_at");

        println!("Found archived message:");
        println!("Account: {}", account);
        println!("Original ID: {}", original_id);
        println!("From: {:?}", from);
        println!("To: {:?}", to);
        println!("Subject: {:?}", subject);
        println!("Received: {:?}", received_at);
        println!("Archived: {}", archived_at);
        println!(
            "--------------------------------------------------------------------------------"
        );
        if let Some(ref text) = body {
            println!("{}", text);
        } else {
            println!("(no body archived)");
        }
    } else {
        println!("No archived messages matching '{}'", args[1]);
    }

    Ok(())
}
