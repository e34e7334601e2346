// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Plain-text tickets and reports written to the export directory.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use time::{Date, Month, Time, Weekday};

use crate::columns::format_money;
use crate::{Assignment, CashBox, DENOMINATIONS, ProductType, Seller, SellerId, Yape};

const WIDTH: usize = 48;

/// `Lunes, 3 de febrero del 2025`.
pub fn format_long_date(date: Date) -> String {
    let day = match date.weekday() {
        Weekday::Monday => "Lunes",
        Weekday::Tuesday => "Martes",
        Weekday::Wednesday => "Miércoles",
        Weekday::Thursday => "Jueves",
        Weekday::Friday => "Viernes",
        Weekday::Saturday => "Sábado",
        Weekday::Sunday => "Domingo",
    };
    let month = match date.month() {
        Month::January => "enero",
        Month::February => "febrero",
        Month::March => "marzo",
        Month::April => "abril",
        Month::May => "mayo",
        Month::June => "junio",
        Month::July => "julio",
        Month::August => "agosto",
        Month::September => "septiembre",
        Month::October => "octubre",
        Month::November => "noviembre",
        Month::December => "diciembre",
    };
    format!("{day}, {} de {month} del {}", date.day(), date.year())
}

fn format_clock(time: Time) -> String {
    format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second())
}

fn centered(text: &str) -> String {
    let len = text.chars().count();
    let pad = WIDTH.saturating_sub(len) / 2;
    format!("{}{text}", " ".repeat(pad))
}

fn spread(left: &str, right: &str) -> String {
    let used = left.chars().count() + right.chars().count();
    let gap = WIDTH.saturating_sub(used).max(1);
    format!("{left}{}{right}", " ".repeat(gap))
}

fn columns(cells: &[(&str, usize)]) -> String {
    let mut line = String::new();
    for (text, width) in cells {
        let text = text.chars().take(*width).collect::<String>();
        let _ = write!(line, "{text:<width$} ", width = *width);
    }
    line.trim_end().to_owned()
}

fn rule(ch: char) -> String {
    ch.to_string().repeat(WIDTH)
}

/// Delivery ticket for one seller's assignment, limited to one product type.
pub fn assignment_ticket(assignment: &Assignment, product_type: ProductType, at: Time) -> String {
    let mut out = Vec::new();
    out.push(centered("COMPROBANTE DE ENTREGA"));
    out.push(centered("Sistema de Distribución El Comercio"));
    out.push(rule('='));
    out.push("INFORMACIÓN DEL VENDEDOR".to_owned());
    out.push(format!("Código: {}", assignment.seller.number_seller));
    out.push(format!(
        "Fecha: {}",
        format_long_date(assignment.date_assignment)
    ));
    out.push(format!("Nombre: {}", assignment.seller.full_name()));
    out.push(rule('-'));
    out.push(format!(
        "{} ASIGNADOS",
        product_type.label().to_uppercase()
    ));
    out.push(columns(&[("Producto", 26), ("Cant.", 6), ("Total", 12)]));

    let mut total = 0.0;
    for detail in assignment
        .detail_assignments
        .iter()
        .filter(|detail| detail.product.product_type == Some(product_type))
        .filter(|detail| detail.quantity > 0)
    {
        let subtotal = detail.assigned_total();
        total += subtotal;
        out.push(columns(&[
            (detail.product.name.as_str(), 26),
            (detail.quantity.to_string().as_str(), 6),
            (format_money(subtotal).as_str(), 12),
        ]));
    }
    out.push(rule('-'));
    out.push(spread("TOTAL ASIGNADO", &format_money(total)));
    out.push(rule('='));
    out.push(centered(&format!("Generado: {}", format_clock(at))));
    out.join("\n") + "\n"
}

#[derive(Debug, Clone, PartialEq)]
pub struct Debtor {
    pub seller: Seller,
    pub debt: f64,
}

/// Sellers with outstanding debt across the given assignments, by name.
pub fn debtors(assignments: &[Assignment]) -> Vec<Debtor> {
    let mut by_seller: BTreeMap<SellerId, Debtor> = BTreeMap::new();
    for assignment in assignments {
        by_seller
            .entry(assignment.seller.id)
            .or_insert_with(|| Debtor {
                seller: assignment.seller.clone(),
                debt: 0.0,
            })
            .debt += assignment.debt();
    }
    let mut debtors = by_seller
        .into_values()
        .filter(|debtor| debtor.debt > 0.0)
        .collect::<Vec<_>>();
    debtors.sort_by_key(|debtor| debtor.seller.full_name().to_lowercase());
    debtors
}

pub fn debtors_report(assignments: &[Assignment], date: Date, at: Time) -> String {
    let mut out = Vec::new();
    out.push(centered("REPORTE DE DEUDORES"));
    out.push(format!("Fecha: {}", format_long_date(date)));
    out.push(rule('='));
    let widths = [18, 8, 9, 8];
    out.push(columns(&[
        ("Nombre", widths[0]),
        ("DNI", widths[1]),
        ("Teléfono", widths[2]),
        ("Estado", widths[3]),
    ]) + " Deuda total (S/.)");
    out.push(rule('-'));
    for debtor in debtors(assignments) {
        let status = if debtor.seller.status {
            "ACTIVO"
        } else {
            "INACTIVO"
        };
        out.push(
            columns(&[
                (debtor.seller.full_name().as_str(), widths[0]),
                (debtor.seller.dni.as_str(), widths[1]),
                (debtor.seller.phone.as_deref().unwrap_or(""), widths[2]),
                (status, widths[3]),
            ]) + &format!(" {:.2}", debtor.debt),
        );
    }
    out.push(rule('='));
    out.push(centered(&format!(
        "Reporte generado a las {}",
        format_clock(at)
    )));
    out.join("\n") + "\n"
}

/// Counts for one cash drawer, as shown on the cash report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawerCount {
    pub cash_box: CashBox,
    pub counts: [i64; 11],
}

pub fn cash_report(date: Date, drawers: &[DrawerCount], yapes: &[Yape], at: Time) -> String {
    let mut out = Vec::new();
    out.push(centered("REPORTE DE CAJA"));
    out.push(format!("Fecha: {}", format_long_date(date)));
    out.push(rule('='));

    for drawer in drawers {
        out.push(format!("CAJA {}", drawer.cash_box.as_str()));
        out.push(columns(&[("Denominación", 16), ("Cantidad", 12), ("Subtotal", 14)]));
        let mut total_cents = 0;
        for (denomination, count) in DENOMINATIONS.iter().zip(drawer.counts) {
            if count <= 0 {
                continue;
            }
            let cents = denomination.cents * count;
            total_cents += cents;
            out.push(columns(&[
                (denomination.label, 16),
                (count.to_string().as_str(), 12),
                (format_money(cents as f64 / 100.0).as_str(), 14),
            ]));
        }
        out.push(spread("Total:", &format_money(total_cents as f64 / 100.0)));
        out.push(rule('='));
    }

    if !yapes.is_empty() {
        out.push("YAPE".to_owned());
        out.push(columns(&[("Fecha", 12), ("Nombre", 20), ("Monto", 12)]));
        let mut total = 0.0;
        for yape in yapes {
            total += yape.amount;
            let date = yape
                .date_yape
                .map(|date| {
                    format!("{:02}/{:02}/{}", date.day(), u8::from(date.month()), date.year())
                })
                .unwrap_or_default();
            out.push(columns(&[
                (date.as_str(), 12),
                (yape.name.as_str(), 20),
                (format_money(yape.amount).as_str(), 12),
            ]));
        }
        out.push(spread("Total:", &format_money(total)));
        out.push(rule('='));
    }

    out.push(centered(&format!(
        "Reporte generado a las {}",
        format_clock(at)
    )));
    out.join("\n") + "\n"
}
