//! Message builders for the notifier. All user-facing text lives here;
//! pipelines call these, never format inline.

use chrono::{NaiveDate, Utc};

use common::models::{Position, Suggestion, TradeAction};
use market_data::sync::SyncOutcome;

use crate::pipelines::ExitAlert;

fn direction_marker(action: TradeAction) -> &'static str {
    match action {
        TradeAction::Buy => "🟢",
        TradeAction::Sell => "🔴",
    }
}

pub fn morning_brief(date: NaiveDate, suggestions: &[Suggestion]) -> String {
    let mut lines = vec![
        format!("Good morning! Pre-market brief — {}", date.format("%d %b %Y")),
        String::new(),
    ];

    if suggestions.is_empty() {
        lines.push("No setups cleared the screen today.".to_string());
    } else {
        lines.push(format!(
            "Top {} setups identified for today:",
            suggestions.len()
        ));
        for (i, s) in suggestions.iter().enumerate() {
            let signals: Vec<&str> = s
                .signals_fired
                .0
                .iter()
                .map(|c| c.signal.name())
                .collect();
            lines.push(format!(
                "{}. {} {}  Entry: ₹{:.2}  Target: ₹{:.2}  SL: ₹{:.2}  R:R {:.1}x  [{}]  Score: {:.2}",
                i + 1,
                direction_marker(s.action),
                s.symbol,
                s.entry_price,
                s.target_price,
                s.stop_loss,
                s.risk_reward,
                signals.join(", "),
                s.composite_score,
            ));
        }
    }

    lines.push(String::new());
    lines.push(
        "Place limit orders in your broker app, then confirm each with \
         `swingbot execute <id>` or pass with `swingbot skip <id>`."
            .to_string(),
    );
    lines.join("\n")
}

pub fn suggestion_message(s: &Suggestion) -> String {
    let signals: Vec<&str> = s.signals_fired.0.iter().map(|c| c.signal.name()).collect();
    format!(
        "📊 Swing setup #{}: {} {}\n\
         Limit entry ₹{:.2} | Target ₹{:.2} | Stop ₹{:.2}\n\
         Qty {} | Risk ₹{:.0} | R:R {:.1}x | Score {:.2}\n\
         Signals: {}",
        s.id,
        direction_marker(s.action),
        s.symbol,
        s.entry_price,
        s.target_price,
        s.stop_loss,
        s.suggested_qty,
        s.risk_amount_inr,
        s.risk_reward,
        s.composite_score,
        signals.join(", "),
    )
}

pub fn entry_zone_alert(s: &Suggestion, last_price: f64) -> String {
    format!(
        "🎯 {} is in its entry zone: last ₹{:.2} vs limit ₹{:.2}.\n\
         Suggestion #{} ({} {}) — place the order if you still want it.",
        s.symbol,
        last_price,
        s.entry_price,
        s.id,
        s.action,
        s.suggested_qty,
    )
}

pub fn exit_alert_message(alert: &ExitAlert) -> String {
    let reason = if alert.target_hit {
        "🎯 Target hit!"
    } else {
        "🛑 Stop loss hit!"
    };
    let pnl_pct = if alert.entry_price > 0.0 {
        (alert.current_price - alert.entry_price) / alert.entry_price
            * 100.0
            * alert.action.sign()
    } else {
        0.0
    };
    format!(
        "⚠️ Exit alert: {} — {reason}\n\
         {} {} | Current ₹{:.2} | Stop ₹{:.2} | Target ₹{:.2}\n\
         Unrealized: {pnl_pct:+.1}%\n\
         Close in your broker app; the next sync will record it.",
        alert.symbol,
        direction_marker(alert.action),
        alert.action,
        alert.current_price,
        alert.stop,
        alert.target,
    )
}

pub fn fund_change_message(outcome: &SyncOutcome) -> String {
    let direction = if outcome.fund_delta_inr > 0.0 {
        "added to"
    } else {
        "withdrawn from"
    };
    format!(
        "💰 Funds {direction} the account: ₹{:.0} (balance now ₹{:.0}).",
        outcome.fund_delta_inr.abs(),
        outcome.fund_balance_inr,
    )
}

pub fn sync_changes_message(outcome: &SyncOutcome) -> String {
    let mut lines = vec!["🔄 Broker sync picked up manual trades:".to_string()];
    for p in &outcome.opened {
        lines.push(format!(
            "  • Opened {} {} ×{} @ ₹{:.2} (stop ₹{:.2}, target ₹{:.2} — review these)",
            p.action, p.symbol, p.quantity, p.entry_price, p.current_stop, p.target,
        ));
    }
    for p in &outcome.closed {
        lines.push(format!(
            "  • Closed {} {} — P&L ₹{:+.0} ({:+.1}%)",
            p.action,
            p.symbol,
            p.pnl_inr.unwrap_or(0.0),
            p.pnl_pct.unwrap_or(0.0),
        ));
    }
    for c in &outcome.conflicts {
        lines.push(format!("  • ⚠️ {c}"));
    }
    for d in &outcome.quantity_drift {
        lines.push(format!(
            "  • ⚠️ {}: quantity drift, ledger {} vs broker {}",
            d.symbol, d.ledger_qty, d.broker_qty,
        ));
    }
    lines.join("\n")
}

pub fn eod_review(
    closed_today: &[Position],
    open_positions: &[Position],
    daily_pnl: f64,
    suggestions_sent: i64,
    suggestions_executed: i64,
) -> String {
    let mut lines = vec![
        format!("End-of-day review — {}", Utc::now().format("%d %b %Y")),
        String::new(),
        format!(
            "Suggestions sent: {suggestions_sent} | Executed: {suggestions_executed} | \
             Skipped: {}",
            suggestions_sent - suggestions_executed
        ),
        String::new(),
    ];

    if !closed_today.is_empty() {
        lines.push("Positions closed today:".to_string());
        for p in closed_today {
            let marker = if p.pnl_inr.unwrap_or(0.0) > 0.0 { "✅" } else { "❌" };
            lines.push(format!(
                "  {marker} {} ({})  Entry ₹{:.2} → Exit ₹{:.2}  P&L ₹{:+.0} ({:+.1}%)",
                p.symbol,
                p.action,
                p.entry_price,
                p.exit_price.unwrap_or(0.0),
                p.pnl_inr.unwrap_or(0.0),
                p.pnl_pct.unwrap_or(0.0),
            ));
        }
        lines.push(String::new());
    }

    lines.push(format!("Today's P&L: ₹{daily_pnl:+.0}"));

    if !open_positions.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "Open positions carrying overnight ({}):",
            open_positions.len()
        ));
        for p in open_positions {
            lines.push(format!(
                "  • {} ({})  Entry ₹{:.2}  SL ₹{:.2}  Target ₹{:.2}",
                p.symbol, p.action, p.entry_price, p.current_stop, p.target,
            ));
        }
    }

    lines.push(String::new());
    lines.push("Signal performance stats updated. Tomorrow's brief at 07:30.".to_string());
    lines.join("\n")
}
