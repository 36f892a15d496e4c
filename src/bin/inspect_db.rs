// Small dev utility: dump kit templates, activities and archive counts.
//
// Usage:
//   cargo run --bin inspect_db -- [db_path]
//
// Read-only; does not start the station.

use anyhow::Context;
use kitting_station::db::{ensure_schema, open_sqlite_connection, read_schema_version};
use kitting_station::domain::Lane;
use kitting_station::engine::ActivityStore;
use kitting_station::repository::{ActivityRepository, KitTemplateRepository};
use std::sync::{Arc, Mutex};

fn main() -> anyhow::Result<()> {
    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(kitting_station::app::get_default_db_path);

    let conn = open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;
    ensure_schema(&conn)?;
    let version = read_schema_version(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let templates = KitTemplateRepository::from_connection(conn.clone()).list_all()?;
    let activity_repo = ActivityRepository::from_connection(conn);
    let activities = activity_repo.list_all()?;

    println!("{}", "=".repeat(40));
    println!("DATABASE INSPECTOR");
    println!("{}", "=".repeat(40));
    println!("db_path={}", db_path);
    println!("schema_version={}", version.map(|v| v.to_string()).unwrap_or_else(|| "-".into()));

    println!("kit templates: {}", templates.len());
    if templates.is_empty() {
        println!("  (kit_template is EMPTY)");
    }
    for template in &templates {
        println!(
            "  {} | {} | {} | lane A {} lines, lane B {} lines",
            template.template_id,
            template.kit_name,
            template.kit_code,
            template.lines_for(Lane::A).count(),
            template.lines_for(Lane::B).count()
        );
    }

    println!("activities: {}", activities.len());
    for activity in &activities {
        let archives = activity_repo.list_archives(&activity.activity_id)?;
        println!(
            "  {} | table {} | {} | {} x{} | A idx={} B idx={} | archives={} | rev={}",
            activity.activity_id,
            activity.workstation_id,
            activity.status,
            activity.kit_name,
            activity.total_kits,
            activity.lane_a.kit_index,
            activity.lane_b.kit_index,
            archives.len(),
            activity.revision
        );
    }

    println!("kit archives total: {}", activity_repo.count_archives()?);
    println!("{}", "=".repeat(40));
    Ok(())
}
