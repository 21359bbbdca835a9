use serde_json::json;

use crate::error::{Error, Result};
use crate::invoke::ErrorValue;
use crate::provider::Provider;
use crate::transport::direct;

fn calculator() -> Provider {
    Provider::new()
        .with_function("plus", |params| async move {
            let a = params[0].as_i64().unwrap_or(0);
            let b = params[1].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        })
        .with_function("minus", |params| async move {
            let a = params[0].as_i64().unwrap_or(0);
            let b = params[1].as_i64().unwrap_or(0);
            Ok(json!(a - b))
        })
}

#[tokio::test]
async fn test_calculator_over_direct_transport() -> Result<()> {
    let (client, server) = direct::couple(None, Some(calculator())).await;
    let driver = client.get_driver();

    let plus: i64 = driver
        .member("plus")
        .call(vec![json!(2).into(), json!(3).into()])
        .await?;
    assert_eq!(plus, 5);

    let minus: i64 = driver
        .member("minus")
        .call(vec![json!(7).into(), json!(4).into()])
        .await?;
    assert_eq!(minus, 3);

    direct::close(&client, &server).await;
    assert_eq!(client.pending_count().await, 0);
    assert_eq!(server.pending_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_nested_provider_resolution() -> Result<()> {
    let vector_add = |params: Vec<serde_json::Value>| async move {
        let u: Vec<i64> = serde_json::from_value(params[0].clone()).unwrap_or_default();
        let v: Vec<i64> = serde_json::from_value(params[1].clone()).unwrap_or_default();
        let sum: Vec<i64> = u.iter().zip(v.iter()).map(|(x, y)| x + y).collect();
        Ok(json!(sum))
    };
    let provider = Provider::new().with_namespace(
        "math",
        Provider::new()
            .with_namespace(
                "scalar",
                Provider::new().with_function("add", |params| async move {
                    let a = params[0].as_i64().unwrap_or(0);
                    let b = params[1].as_i64().unwrap_or(0);
                    Ok(json!(a + b))
                }),
            )
            .with_namespace("vector", Provider::new().with_function("add", vector_add)),
    );

    let (client, _server) = direct::couple(None, Some(provider)).await;
    let driver = client.get_driver();

    let sum: Vec<i64> = driver
        .member("math")
        .member("vector")
        .member("add")
        .call(vec![json!([1, 2]).into(), json!([3, 4]).into()])
        .await?;
    assert_eq!(sum, vec![4, 6]);

    // Invoking an intermediate namespace fails on the remote side.
    let err = driver
        .member("math")
        .member("vector")
        .invoke(vec![])
        .await
        .expect_err("a namespace is not callable");
    assert!(err.is_resolution_error(), "got: {err}");
    Ok(())
}

#[tokio::test]
async fn test_remote_throw_preserves_error_identity() -> Result<()> {
    let provider = Provider::new().with_function("bad", |_| async {
        Err(ErrorValue::new("RangeError", "oops").with_stack("bad@provider.rs:1"))
    });
    let (client, _server) = direct::couple(None, Some(provider)).await;

    let err = client
        .get_driver()
        .member("bad")
        .invoke(vec![])
        .await
        .expect_err("bad always throws");
    match err {
        Error::ErrRemote(value) => {
            assert_eq!(value.name, "RangeError");
            assert_eq!(value.message, "oops");
            assert_eq!(value.stack, "bad@provider.rs:1");
        }
        other => panic!("expected a remote error, got: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_call_without_provider_fails_remotely() -> Result<()> {
    let (client, _server) = direct::couple(None, None).await;

    let err = client
        .get_driver()
        .member("plus")
        .invoke(vec![])
        .await
        .expect_err("peer has no provider");
    assert!(err.is_no_provider_error(), "got: {err}");
    Ok(())
}

#[tokio::test]
async fn test_both_directions_share_one_stream() -> Result<()> {
    let ping = Provider::new().with_function("ping", |_| async { Ok(json!("client")) });
    let pong = Provider::new().with_function("pong", |_| async { Ok(json!("server")) });
    let (client, server) = direct::couple(Some(ping), Some(pong)).await;

    let from_server: String = client.get_driver().member("pong").call(vec![]).await?;
    let from_client: String = server.get_driver().member("ping").call(vec![]).await?;
    assert_eq!(from_server, "server");
    assert_eq!(from_client, "client");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls_multiplex_on_uid() -> Result<()> {
    let provider = Provider::new().with_function("echo_after", |params| async move {
        let delay = params[0].as_u64().unwrap_or(0);
        tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
        Ok(params[1].clone())
    });
    let (client, _server) = direct::couple(None, Some(provider)).await;
    let driver = client.get_driver().member("echo_after");

    // The slower call is sent first; returns arrive in the opposite order
    // and are still correlated correctly.
    let slow = driver.call::<String>(vec![json!(50).into(), json!("slow").into()]);
    let fast = driver.call::<String>(vec![json!(1).into(), json!("fast").into()]);
    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(slow?, "slow");
    assert_eq!(fast?, "fast");
    Ok(())
}
