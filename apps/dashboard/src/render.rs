use std::fmt::Write as _;

use sync_core::{Order, StatusCounts, SyncStatus};

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

pub fn sync_banner(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Unavailable => "sync unavailable",
        SyncStatus::Synchronizing => "synchronizing...",
        SyncStatus::Synchronized => "live",
        SyncStatus::Degraded => "degraded: showing last synchronized data",
    }
}

pub fn order_row(order: &Order) -> String {
    let amount = order
        .amount
        .map(|amount| format!("{amount:.2}"))
        .unwrap_or_else(|| "-".into());
    let created = order
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "{:<14} {:<20} {:<18} {:>10} {:<12} {:<14} {}",
        or_dash(order.order_id.as_deref()),
        or_dash(order.customer_name.as_deref()),
        or_dash(order.item.as_deref()),
        amount,
        or_dash(order.marketplace.as_deref()),
        order.status,
        created,
    )
}

pub fn counts_line(counts: &StatusCounts) -> String {
    let mut line = format!("total {}", counts.total());
    for (status, count) in counts.iter() {
        let _ = write!(line, " | {status} {count}");
    }
    line
}

/// Full screen: banner, counts, then one row per order (record id last for `advance`/`delete`).
pub fn render_view(orders: &[Order], counts: &StatusCounts, status: SyncStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}]", sync_banner(status));
    let _ = writeln!(out, "{}", counts_line(counts));
    if orders.is_empty() {
        out.push_str("no orders match\n");
        return out;
    }
    for order in orders {
        let _ = writeln!(out, "{}  ({})", order_row(order), order.id);
    }
    out
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
