// Manual probe against the BscScan account API: prints row counts for the
// three feeds the service reconciles. Usage: probe_feeds <address>
use reqwest::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base = std::env::var("BSCSCAN_API_URL")
        .unwrap_or_else(|_| "https://api.bscscan.com/api".to_string());
    let api_key = std::env::var("BSCSCAN_API_KEY").unwrap_or_default();
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0xb300000b72DEAEb607a12d5f54773D1C19c7028d".to_string());

    let client = Client::new();

    for action in ["txlist", "txlistinternal", "tokentx"] {
        let url = format!(
            "{base}?module=account&action={action}&address={address}&startblock=0&endblock=99999999&sort=desc&apikey={api_key}"
        );
        let body: serde_json::Value = client.get(&url).send().await?.json().await?;
        let rows = body["result"].as_array().map(|r| r.len()).unwrap_or(0);
        println!(
            "{action}: status={} message={} rows={}",
            body["status"], body["message"], rows
        );
        if let Some(first) = body["result"].as_array().and_then(|r| r.first()) {
            println!("  first row = {first:#}");
        }
    }

    Ok(())
}
