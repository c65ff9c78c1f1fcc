//! Native-messaging framing: a 4-byte little-endian length prefix followed by
//! that many bytes of UTF-8 JSON.

use std::io;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Largest payload accepted in either direction.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type FrameReader<R> = FramedRead<R, LengthDelimitedCodec>;
pub type FrameWriter<W> = FramedWrite<W, LengthDelimitedCodec>;

pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .little_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

pub fn frame_reader<R: AsyncRead>(reader: R) -> FrameReader<R> {
    FramedRead::new(reader, frame_codec())
}

pub fn frame_writer<W: AsyncWrite>(writer: W) -> FrameWriter<W> {
    FramedWrite::new(writer, frame_codec())
}

/// Serialize one message body. The codec adds the length prefix.
pub fn encode_payload<T: Serialize>(message: &T) -> Result<Bytes, FrameError> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    Ok(Bytes::from(payload))
}

pub fn decode_payload(payload: &[u8]) -> Result<Value, FrameError> {
    Ok(serde_json::from_slice(payload)?)
}

/// The full on-the-wire bytes of one frame, prefix included.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let payload = encode_payload(message)?;
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn prefix_is_little_endian_length() {
        let frame = encode_frame(&json!({"a": 1})).unwrap();
        let body = br#"{"a":1}"#;
        assert_eq!(&frame[..4], &(body.len() as u32).to_le_bytes());
        assert_eq!(&frame[4..], body);
    }

    #[tokio::test]
    async fn reader_decodes_hand_built_frames() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut reader = frame_reader(server);

        client
            .write_all(&encode_frame(&json!({"id": 1, "status": "success"})).unwrap())
            .await
            .unwrap();
        client.write_all(&encode_frame(&json!([1, 2])).unwrap()).await.unwrap();
        drop(client);

        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(decode_payload(&first).unwrap()["id"], 1);
        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(decode_payload(&second).unwrap(), json!([1, 2]));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn writer_output_matches_hand_built_frame() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut writer = frame_writer(client);
        let message = json!({"command": {"id": 9, "action": "click"}});
        writer.send(encode_payload(&message).unwrap()).await.unwrap();
        drop(writer);

        let mut raw = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut raw)
            .await
            .unwrap();
        assert_eq!(raw, encode_frame(&message).unwrap());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = frame_reader(server);
        let len = (MAX_FRAME_LEN as u32) + 1;
        client.write_all(&len.to_le_bytes()).await.unwrap();

        assert!(reader.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = frame_reader(server);
        client.write_all(&10u32.to_le_bytes()).await.unwrap();
        client.write_all(b"{\"a\"").await.unwrap();
        drop(client);

        assert!(reader.next().await.unwrap().is_err());
    }
}
