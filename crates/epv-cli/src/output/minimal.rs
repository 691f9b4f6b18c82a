use serde_json::Value;

use super::flatten::format_value;

/// Headline figure for each kind of output, most specific first.
const HEADLINES: [&str; 10] = [
    "/epv/valuation/enterprise_value",
    "/valuation/enterprise_value",
    "/wacc",
    "/enterprise_value/mean",
    "/probability_weighted_ev",
    "/irr",
    "/cash_consideration",
    "/base_enterprise_value",
    "/base_case_value",
    "/base/enterprise_value",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for pointer in HEADLINES {
        if let Some(val) = result.pointer(pointer) {
            // /wacc is an object in the full report; skip it there
            if !val.is_null() && !val.is_object() {
                println!("{}", format_value(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_value(val));
            return;
        }
    }

    println!("{}", format_value(result));
}
