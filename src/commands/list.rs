//! List command implementation.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

use crate::store::{BanRecord, BanStore, Persistence, RedbBanStore};

#[derive(Debug, Serialize)]
struct ListedBan {
    address: String,
    expires_at: i64,
    expiry: String,
    remaining_seconds: i64,
}

/// Run the list command
pub async fn run(db: &Path, json: bool) -> Result<()> {
    let path = match Persistence::from_arg(db) {
        Persistence::Durable(path) => path,
        Persistence::Ephemeral => bail!("an in-memory ban database cannot be listed"),
    };
    if !path.exists() {
        bail!("Ban database not found: {}", path.display());
    }

    let store = RedbBanStore::open(&path).with_context(|| {
        format!(
            "Failed to open ban database {} (is the daemon running?)",
            path.display()
        )
    })?;
    let mut records = store.scan()?;
    records.sort_by_key(|r| r.expires_at);

    let now = Utc::now().timestamp();
    if json {
        let listed: Vec<ListedBan> = records.iter().map(|r| listed(r, now)).collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    println!();
    if records.is_empty() {
        println!("No active bans");
        println!();
        return Ok(());
    }

    println!("{:<18} {:<22} REMAINING", "ADDRESS", "EXPIRES (UTC)");
    for record in &records {
        let ban = listed(record, now);
        println!(
            "{:<18} {:<22} {}",
            ban.address,
            ban.expiry,
            format_remaining(ban.remaining_seconds)
        );
    }
    println!();
    println!("{} ban(s)", records.len());
    println!();
    Ok(())
}

fn listed(record: &BanRecord, now: i64) -> ListedBan {
    ListedBan {
        address: record.address.clone(),
        expires_at: record.expires_at,
        expiry: record
            .expiry()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "?".to_string()),
        remaining_seconds: record.expires_at - now,
    }
}

/// Format the time left on a ban
fn format_remaining(seconds: i64) -> String {
    if seconds < 0 {
        "expired".to_string()
    } else if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(-1), "expired");
        assert_eq!(format_remaining(0), "0s");
        assert_eq!(format_remaining(59), "59s");
        assert_eq!(format_remaining(600), "10m");
        assert_eq!(format_remaining(3 * 3600 + 5 * 60), "3h 5m");
        assert_eq!(format_remaining(2 * 86400 + 4 * 3600), "2d 4h");
    }

    #[test]
    fn test_listed_ban() {
        let record = BanRecord {
            address: "192.0.2.1".to_string(),
            expires_at: 1_700_003_600,
        };
        let ban = listed(&record, 1_700_000_000);
        assert_eq!(ban.remaining_seconds, 3600);
        assert_eq!(ban.expiry, "2023-11-14 23:13:20");
    }

    #[tokio::test]
    async fn test_list_memory_db_rejected() {
        assert!(run(Path::new(":memory:"), false).await.is_err());
    }

    #[tokio::test]
    async fn test_list_missing_db() {
        let dir = TempDir::new().unwrap();
        let err = run(&dir.path().join("absent.redb"), false).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_list_existing_db() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bans.redb");
        {
            let store = RedbBanStore::open(&path).unwrap();
            store.put("192.0.2.1", Utc::now().timestamp() + 60).unwrap();
        }
        assert!(run(&path, true).await.is_ok());
        assert!(run(&path, false).await.is_ok());
    }
}
