//! The demo tools: mocked weather, a calculator and world clocks.

use crate::calc;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use mcp::{CallToolParams, CallToolResult, JsonRpcError, Tool};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CityArgs {
    city: String,
}

#[derive(Debug, Deserialize)]
struct ExpressionArgs {
    expression: String,
}

/// Tool definitions advertised by `tools/list`.
pub fn list() -> Vec<Tool> {
    vec![
        tool(
            "get_weather",
            "Get current weather in a specified city (mocked response).",
            "city",
        ),
        tool(
            "calculate",
            "Evaluate a basic math expression safely.",
            "expression",
        ),
        tool(
            "get_time",
            "Get the current time in a specified city.",
            "city",
        ),
    ]
}

/// Schema in the shape Python MCP servers emit, titles and all.
fn tool(name: &str, description: &str, arg: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: json!({
            "type": "object",
            "title": format!("{name}Arguments"),
            "properties": {
                arg: {"type": "string", "title": title_case(arg)}
            },
            "required": [arg]
        }),
    }
}

/// Run one `tools/call`.
///
/// Unknown tools are protocol errors; bad arguments and evaluation failures
/// are tool errors reported in the result.
pub fn call(params: CallToolParams) -> Result<CallToolResult, JsonRpcError> {
    let arguments = params.arguments.unwrap_or_else(|| json!({}));
    debug!(tool = %params.name, %arguments, "tool call");

    let result = match params.name.as_str() {
        "get_weather" => with_args(arguments, |CityArgs { city }| {
            CallToolResult::text(weather(&city))
        }),
        "calculate" => with_args(arguments, |ExpressionArgs { expression }| {
            calculate(&expression)
        }),
        "get_time" => with_args(arguments, |CityArgs { city }| {
            CallToolResult::text(local_time(&city, Utc::now()))
        }),
        other => {
            return Err(JsonRpcError::invalid_params(format!("unknown tool: {other}")));
        }
    };
    Ok(result)
}

fn with_args<A: DeserializeOwned>(
    arguments: Value,
    run: impl FnOnce(A) -> CallToolResult,
) -> CallToolResult {
    match serde_json::from_value(arguments) {
        Ok(args) => run(args),
        Err(e) => CallToolResult::error(format!("invalid arguments: {e}")),
    }
}

fn weather(city: &str) -> String {
    match city.trim().to_lowercase().as_str() {
        "london" => "It's cloudy and 18°C in London.".to_string(),
        "new york" => "It's sunny and 25°C in New York.".to_string(),
        "tokyo" => "It's rainy and 20°C in Tokyo.".to_string(),
        "paris" => "It's 22°C with light showers in Paris.".to_string(),
        _ => format!("Sorry, I don't have weather data for {city}."),
    }
}

fn calculate(expression: &str) -> CallToolResult {
    match calc::evaluate(expression) {
        Ok(value) => {
            CallToolResult::text(format!("The result is: {}", calc::format_number(value)))
        }
        Err(e) => CallToolResult::error(format!("Error evaluating expression: {e}")),
    }
}

fn timezone(city: &str) -> Option<Tz> {
    let tz = match city.trim().to_lowercase().as_str() {
        "new york" => chrono_tz::America::New_York,
        "london" => chrono_tz::Europe::London,
        "tokyo" => chrono_tz::Asia::Tokyo,
        "paris" => chrono_tz::Europe::Paris,
        "sydney" => chrono_tz::Australia::Sydney,
        _ => return None,
    };
    Some(tz)
}

fn local_time(city: &str, now: DateTime<Utc>) -> String {
    match timezone(city) {
        Some(tz) => format!(
            "The local time in {} is {}",
            title_case(city.trim()),
            now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S")
        ),
        None => format!("Sorry, timezone info for '{city}' isn't available."),
    }
}

/// Upper-case the first letter of every word, lower-case the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}
