// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Display names for TLC vendor ids and payment type codes.

pub fn vendor_name(id: i64) -> Option<&'static str> {
    match id {
        1 => Some("Creative Mobile Technologies, LLC"),
        2 => Some("Curb Mobility, LLC"),
        6 => Some("Myle Technologies Inc"),
        7 => Some("Helix"),
        _ => None,
    }
}

pub fn payment_type_name(code: i32) -> Option<&'static str> {
    match code {
        0 => Some("Flex Fare trip"),
        1 => Some("Credit card"),
        2 => Some("Cash"),
        3 => Some("No charge"),
        4 => Some("Dispute"),
        5 => Some("Unknown"),
        6 => Some("Voided trip"),
        _ => None,
    }
}

/// Payment label for a result row; unrecognized codes render as the number.
pub fn payment_label(code: Option<i32>) -> String {
    match code {
        Some(c) => payment_type_name(c).map_or_else(|| c.to_string(), str::to_string),
        None => "(null)".to_string(),
    }
}
