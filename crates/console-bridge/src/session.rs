//! Session state machine and relay pumps.
//!
//! A session moves through opening (resolve handle, create + attach +
//! start the remote process), running (two concurrent pumps), and
//! closing. The first pump to finish, for any reason, wins: the other
//! pump is aborted and both resources are released by drop, which
//! unblocks any read still pending on the peer side.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use console_context::{ClientRegistry, RegistryError};
use console_core::{Engine, EngineDialer, EngineError, ProcessId, ProcessSpec, ProcessStream, TerminalSize};

use crate::frames::{FrameSink, FrameSource, InFrame, OutFrame};
use crate::protocol::ControlFrame;

/// Read size for the outbound pump.
const OUTBOUND_CHUNK: usize = 1024;

/// Session setup failure, reported to the operator before closing.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    /// The remote process stream reached end of file.
    ProcessEof,
    /// Read or write error on the remote process stream.
    ProcessError(String),
    /// The operator closed the connection.
    OperatorClosed,
    /// The operator connection failed mid-relay.
    OperatorError(String),
}

/// Run one interactive shell session to completion.
///
/// Setup failures are delivered to the operator as a readable text
/// frame, since at that point the operator connection is the only
/// channel able to report them, and the connection is then closed.
/// Relay failures tear the session down without further notice.
pub async fn run_session<D, Si, So>(
    registry: &ClientRegistry<D>,
    context: &str,
    container: &str,
    mut sink: Si,
    source: So,
) where
    D: EngineDialer,
    Si: FrameSink + 'static,
    So: FrameSource + 'static,
{
    let session_id = Uuid::new_v4();
    tracing::info!(%session_id, context, container, "opening shell session");

    let setup = open(registry, context, container).await;
    let (engine, process, stream) = match setup {
        Ok(parts) => parts,
        Err(e) => {
            tracing::warn!(%session_id, context, container, "session setup failed: {e}");
            let _ = sink
                .send(OutFrame::Text(format!("Error opening shell: {e}\r\n")))
                .await;
            sink.close().await;
            return;
        }
    };

    let cause = relay(engine, process, stream, sink, source, session_id).await;
    tracing::info!(%session_id, ?cause, "session closed");
}

async fn open<D: EngineDialer>(
    registry: &ClientRegistry<D>,
    context: &str,
    container: &str,
) -> Result<(Arc<dyn Engine>, ProcessId, ProcessStream), BridgeError> {
    let engine = registry.get(context).await?;
    let process = engine
        .create_process(container, &ProcessSpec::interactive_shell())
        .await?;
    let stream = engine.attach(&process).await?;
    // Relay must not begin until the start call has succeeded.
    engine.start(&process).await?;
    Ok((engine, process, stream))
}

/// Relay bytes between the process stream and the operator connection
/// until either side terminates.
pub async fn relay<Si, So>(
    engine: Arc<dyn Engine>,
    process: ProcessId,
    stream: ProcessStream,
    sink: Si,
    source: So,
    session_id: Uuid,
) -> TerminationCause
where
    Si: FrameSink + 'static,
    So: FrameSource + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut outbound = tokio::spawn(outbound_pump(reader, sink));
    let mut inbound = tokio::spawn(inbound_pump(source, writer, engine, process, session_id));

    // Single-slot completion: whichever pump finishes first wins. The
    // loser is aborted; dropping its handles closes the resources it
    // owned, which unblocks the peer side.
    tokio::select! {
        res = &mut outbound => {
            inbound.abort();
            res.unwrap_or_else(|e| TerminationCause::ProcessError(e.to_string()))
        }
        res = &mut inbound => {
            outbound.abort();
            res.unwrap_or_else(|e| TerminationCause::OperatorError(e.to_string()))
        }
    }
}

/// Read raw process bytes in fixed-size chunks and forward each
/// non-empty chunk as one binary frame, order preserved.
async fn outbound_pump<R, Si>(mut reader: R, mut sink: Si) -> TerminationCause
where
    R: AsyncRead + Unpin,
    Si: FrameSink,
{
    let mut buf = [0u8; OUTBOUND_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                sink.close().await;
                return TerminationCause::ProcessEof;
            }
            Ok(n) => {
                if let Err(e) = sink.send(OutFrame::Binary(buf[..n].to_vec())).await {
                    return TerminationCause::OperatorError(e.to_string());
                }
            }
            Err(e) => {
                sink.close().await;
                return TerminationCause::ProcessError(e.to_string());
            }
        }
    }
}

/// Decode operator frames: write `input` data verbatim to the process,
/// apply `resize` frames, drop everything else.
async fn inbound_pump<So, W>(
    mut source: So,
    mut writer: W,
    engine: Arc<dyn Engine>,
    process: ProcessId,
    session_id: Uuid,
) -> TerminationCause
where
    So: FrameSource,
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = source.next().await {
        let InFrame::Text(text) = frame else { continue };
        // Malformed control frames are dropped, never escalated.
        let Some(control) = ControlFrame::parse(&text) else {
            tracing::warn!(%session_id, "dropping malformed control frame");
            continue;
        };
        match control {
            ControlFrame::Input { data } => {
                if let Err(e) = async {
                    writer.write_all(data.as_bytes()).await?;
                    writer.flush().await
                }
                .await
                {
                    return TerminationCause::ProcessError(e.to_string());
                }
            }
            ControlFrame::Resize { rows, cols } => {
                let size = TerminalSize { rows, cols };
                match engine.resize(&process, size).await {
                    Ok(()) => tracing::debug!(%session_id, rows, cols, "terminal resized"),
                    // Resize failures never end the session.
                    Err(e) => {
                        tracing::warn!(%session_id, rows, cols, "terminal resize failed: {e}");
                    }
                }
            }
        }
    }
    TerminationCause::OperatorClosed
}
