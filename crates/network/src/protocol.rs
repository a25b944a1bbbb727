//! Wire codec for the block request-response protocol that backs C6's
//! per-peer fetch step. Stands in for the "bitswap/graphsync wire
//! protocols" the specification names as an out-of-scope boundary assumed
//! to expose `RequestBlock(cid, peer) -> bytes`; this is the minimal
//! concrete realization of that assumption.

use std::io;

use futures_util::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use libp2p::request_response;
use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};
use taskmesh_primitives::block::BlockId;

pub const BLOCK_PROTOCOL: StreamProtocol = StreamProtocol::new("/taskmesh/block/1.0.0");

/// Cap on a single block response, so a misbehaving peer cannot make the
/// reader buffer an unbounded amount of memory.
const MAX_BLOCK_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockRequestMsg {
    pub id: BlockId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockResponseMsg {
    pub data: Option<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct BlockCodec;

async fn read_framed<T: AsyncRead + Unpin + Send>(io: &mut T) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0_u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_BLOCK_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut buf = vec![0_u8; len];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_framed<T: AsyncWrite + Unpin + Send>(io: &mut T, bytes: &[u8]) -> io::Result<()> {
    #[allow(clippy::cast_possible_truncation, reason = "frames stay under MAX_BLOCK_BYTES")]
    let len = (bytes.len() as u32).to_be_bytes();
    io.write_all(&len).await?;
    io.write_all(bytes).await?;
    io.flush().await
}

#[async_trait::async_trait]
impl request_response::Codec for BlockCodec {
    type Protocol = StreamProtocol;
    type Request = BlockRequestMsg;
    type Response = BlockResponseMsg;

    async fn read_request<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let bytes = read_framed(io).await?;
        serde_json::from_slice(&bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    async fn read_response<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let bytes = read_framed(io).await?;
        serde_json::from_slice(&bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    async fn write_request<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        req: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let bytes = serde_json::to_vec(&req).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        write_framed(io, &bytes).await
    }

    async fn write_response<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        resp: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let bytes = serde_json::to_vec(&resp).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        write_framed(io, &bytes).await
    }
}
