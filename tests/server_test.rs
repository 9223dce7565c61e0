//! Integration tests for the control API HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use crossbeam_channel::{unbounded, Receiver};
    use speedcam_sentinel::agent::{create_shared_status, ControlCommand, SharedStatus};
    use speedcam_sentinel::server::{run, ServerConfig};
    use speedcam_sentinel::session::{SessionState, Visibility};
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn start() -> (
        SocketAddr,
        tokio::sync::oneshot::Sender<()>,
        Receiver<ControlCommand>,
        SharedStatus,
    ) {
        let (commands, receiver) = unbounded();
        let status = create_shared_status();
        let (addr, shutdown_tx) = run(ServerConfig::new(0), commands, status.clone())
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (addr, shutdown_tx, receiver, status)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx, _receiver, _status) = start().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_status_reflects_shared_status() {
        let (addr, shutdown_tx, _receiver, status) = start().await;
        {
            let mut published = status.write().unwrap();
            published.state = SessionState::Active;
            published.catalog_size = 7;
        }

        let body: serde_json::Value = reqwest::get(format!("http://{}/status", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert_eq!(body["state"], "active");
        assert_eq!(body["catalog_size"], 7);
        assert!(body["active_alert"].is_null());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_mutations_are_forwarded_as_commands() {
        let (addr, shutdown_tx, receiver, _status) = start().await;
        let client = reqwest::Client::new();

        for path in ["/tracking/start", "/alert/dismiss", "/tracking/stop"] {
            let response = client
                .post(format!("http://{}{}", addr, path))
                .send()
                .await
                .expect("Failed to send request");
            assert!(response.status().is_success(), "{path} failed");
        }

        let response = client
            .post(format!("http://{}/visibility", addr))
            .json(&serde_json::json!({ "visible": false }))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let received: Vec<ControlCommand> = receiver.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ControlCommand::Start,
                ControlCommand::Dismiss,
                ControlCommand::Stop,
                ControlCommand::Visibility(Visibility::Hidden),
            ]
        );

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_commands_rejected_when_agent_gone() {
        let (addr, shutdown_tx, receiver, _status) = start().await;
        drop(receiver);

        let response = reqwest::Client::new()
            .post(format!("http://{}/tracking/start", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "AGENT_STOPPED");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_visibility_requires_body() {
        let (addr, shutdown_tx, receiver, _status) = start().await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/visibility", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_client_error());
        assert!(receiver.try_recv().is_err());

        let _ = shutdown_tx.send(());
    }
}
