use canvas_core::receipt::Receipt;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns separated by two spaces.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:w$}"))
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    line(headers.iter().map(|h| h.to_string()).collect());
    line(widths.iter().map(|&w| "-".repeat(w)).collect());
    for row in rows {
        line(row);
    }
}

pub fn receipt_row(r: &Receipt) -> Vec<String> {
    vec![
        r.action_id.to_string(),
        r.action_type.clone(),
        r.final_status.to_string(),
        r.completed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]
}

pub fn print_receipt(r: &Receipt) {
    println!("Action:    {}", r.action_id);
    println!("Type:      {}", r.action_type);
    println!("Status:    {}", r.final_status);
    println!("Completed: {}", r.completed_at.to_rfc3339());
    println!("Payload:   {}", r.payload_summary);
    if let Some(detail) = &r.detail {
        println!("Detail:    {detail}");
    }
}
