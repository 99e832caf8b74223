//! Message formatting (Telegram HTML)

use crate::models::{AlertDirection, WatchedAlert};

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// `7GCi...W2hr`
pub fn short_address(address: &str) -> String {
    if address.len() <= 12 {
        return address.to_string();
    }
    format!("{}...{}", &address[..4], &address[address.len() - 4..])
}

/// Prices of meme tokens span many orders of magnitude
pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        "0".to_string()
    } else if price.abs() >= 1.0 {
        format!("{:.4}", price)
    } else {
        // Keep four significant digits
        let digits = (-price.abs().log10()).ceil() as usize + 3;
        let s = format!("{:.*}", digits.min(18), price);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn format_amount(amount: f64) -> String {
    let whole = amount.round() as i64;
    let raw = whole.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn price_alert(alert: &WatchedAlert, current_price: f64) -> String {
    let (icon, verb) = match alert.direction {
        AlertDirection::Above => ("📈", "rose above"),
        AlertDirection::Below => ("📉", "fell below"),
    };

    format!(
        "{icon} <b>Price alert: {symbol}</b>\n\
         {symbol} {verb} your target of ${target}\n\
         Current price: ${current}\n\
         <code>{address}</code>",
        icon = icon,
        symbol = escape_html(&alert.token_symbol),
        verb = verb,
        target = format_price(alert.target_price),
        current = format_price(current_price),
        address = escape_html(&alert.token_address),
    )
}

pub fn large_buy(mint: &str, buyer: &str, amount: f64, signature: &str) -> String {
    format!(
        "🐋 <b>Large buy</b>\n\
         {buyer} bought {amount} tokens of <code>{mint}</code>\n\
         <a href=\"https://solscan.io/tx/{sig}\">View transaction</a>",
        buyer = escape_html(&short_address(buyer)),
        amount = format_amount(amount),
        mint = escape_html(&short_address(mint)),
        sig = escape_html(signature),
    )
}

pub fn fee_ready(mint: &str, fee_wallet: &str, balance_sol: f64, threshold_sol: f64) -> String {
    format!(
        "💰 <b>Fees ready to claim</b>\n\
         Fee wallet {wallet} for <code>{mint}</code> holds {balance:.4} SOL \
         (threshold {threshold} SOL)",
        wallet = escape_html(&short_address(fee_wallet)),
        mint = escape_html(&short_address(mint)),
        balance = balance_sol,
        threshold = threshold_sol,
    )
}
