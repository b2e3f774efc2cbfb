// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Signal conversion and pump tasks.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use zbus::zvariant::{Structure, Value};
use zbus::proxy::SignalStream;
use zbus::Message;

use uabridge_core::{BusSignal, SignalArg};

/// Converts one signal argument.
pub fn value_to_arg(value: &Value<'_>) -> SignalArg {
    match value {
        Value::I32(v) => SignalArg::Int32(*v),
        Value::U32(v) => SignalArg::UInt32(*v),
        Value::F64(v) => SignalArg::Double(*v),
        Value::Bool(v) => SignalArg::Boolean(*v),
        Value::Str(s) => SignalArg::Str(s.as_str().to_string()),
        other => SignalArg::Other(other.value_signature().to_string()),
    }
}

/// Converts a received signal message.
///
/// A body that cannot be read yields an empty payload, which the
/// dispatcher rejects as malformed.
pub fn message_to_signal(message: &Message) -> BusSignal {
    let header = message.header();
    let name = header
        .member()
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let sender = header
        .sender()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default();

    let payload = match message.body().deserialize::<Structure<'_>>() {
        Ok(body) => body.fields().iter().map(value_to_arg).collect(),
        Err(e) => {
            warn!(signal = %name, sender = %sender, error = %e, "Unreadable signal body");
            Vec::new()
        }
    };

    BusSignal::new(name, sender, payload)
}

/// Forwards every message of `stream` into `tx` until cancelled.
pub(crate) fn spawn_pump(
    name: &'static str,
    mut stream: SignalStream<'static>,
    tx: mpsc::Sender<BusSignal>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(signal = name, "Signal pump started");
        loop {
            let message = tokio::select! {
                _ = token.cancelled() => break,
                message = stream.next() => message,
            };

            let Some(message) = message else {
                warn!(signal = name, "Signal stream closed");
                break;
            };

            let signal = message_to_signal(&message);
            trace!(%signal, "Signal received");
            if tx.send(signal).await.is_err() {
                debug!(signal = name, "Signal receiver dropped");
                break;
            }
        }
        debug!(signal = name, "Signal pump stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_arg() {
        assert_eq!(value_to_arg(&Value::from(7i32)), SignalArg::Int32(7));
        assert_eq!(value_to_arg(&Value::from(7u32)), SignalArg::UInt32(7));
        assert_eq!(value_to_arg(&Value::from(36.6f64)), SignalArg::Double(36.6));
        assert_eq!(value_to_arg(&Value::from(true)), SignalArg::Boolean(true));
        assert_eq!(
            value_to_arg(&Value::from("celsius")),
            SignalArg::Str("celsius".to_string())
        );
        assert!(matches!(value_to_arg(&Value::from(1u8)), SignalArg::Other(_)));
    }
}
