//! Drives the built toolbox binary through the MCP client.

use mcp::{Server, ServerConfig};
use serde_json::json;

fn toolbox() -> ServerConfig {
    ServerConfig {
        name: "toolbox".to_string(),
        command: env!("CARGO_BIN_EXE_tether-toolbox").to_string(),
        args: Vec::new(),
        env: Default::default(),
        timeout: Some(std::time::Duration::from_secs(10)),
    }
}

#[tokio::test]
async fn handshake_and_tool_calls() {
    let server = Server::spawn(toolbox()).await.unwrap();
    server.initialize().await.unwrap();

    let info = server.server_info().await.unwrap();
    assert_eq!(info.server_info.name, "tether-toolbox");

    let names: Vec<String> = server.tools().await.into_iter().map(|t| t.name).collect();
    assert_eq!(names, ["get_weather", "calculate", "get_time"]);

    let weather = server
        .call_tool("get_weather", Some(json!({"city": "London"})))
        .await
        .unwrap();
    assert_eq!(weather.joined_text(), "It's cloudy and 18°C in London.");

    let sum = server
        .call_tool("calculate", Some(json!({"expression": "123 * 45 + 9"})))
        .await
        .unwrap();
    assert_eq!(sum.joined_text(), "The result is: 5544");

    let time = server
        .call_tool("get_time", Some(json!({"city": "sydney"})))
        .await
        .unwrap();
    assert!(time.joined_text().starts_with("The local time in Sydney is "));

    let unknown = server.call_tool("launch_rocket", None).await;
    assert!(matches!(unknown, Err(mcp::Error::JsonRpc(_))));

    server.shutdown().await.unwrap();
}
