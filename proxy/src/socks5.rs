//! Server side of the SOCKS5 handshake: method selection and the request
//! phase of RFC 1928. No authentication is offered and only CONNECT is
//! meaningful to a relay; command dispatch is left to the caller.

use hopwire_core::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const VERSION: u8 = 5;
pub const METHOD_NO_AUTH: u8 = 0;

pub const CMD_CONNECT: u8 = 1;
pub const CMD_BIND: u8 = 2;
pub const CMD_UDP_ASSOCIATE: u8 = 3;

pub const ATYP_IPV4: u8 = 1;
pub const ATYP_DOMAIN: u8 = 3;
pub const ATYP_IPV6: u8 = 4;

pub const REP_SUCCEEDED: u8 = 0;
pub const REP_COMMAND_NOT_SUPPORTED: u8 = 7;
pub const REP_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 8;

/// Every single read and write of the handshake is bounded by this deadline.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(8);

/// The request phase, reduced to what a relay needs: the command and the
/// destination in `host:port` form.
#[derive(Debug)]
pub struct Request {
    pub command: u8,
    pub destination: String,
}

/// Runs the method-selection phase and reads the client's request.
pub async fn handshake(stream: &mut TcpStream) -> Result<Request> {
    negotiate_method(stream).await?;
    read_request(stream).await
}

/// Replies with `code` and a zeroed IPv4 bind address.
pub async fn send_reply(stream: &mut TcpStream, code: u8) -> Result<()> {
    let reply = [VERSION, code, 0, ATYP_IPV4, 0, 0, 0, 0, 0, 0];
    write_with_deadline(stream, &reply).await
}

async fn negotiate_method(stream: &mut TcpStream) -> Result<()> {
    let mut greeting = [0u8; 2];
    read_with_deadline(stream, &mut greeting).await?;

    let [version, method_count] = greeting;
    if version != VERSION {
        return Err(Error::handshake(format!("unsupported version {version}")));
    }

    let mut methods = [0u8; 255];
    read_with_deadline(stream, &mut methods[..usize::from(method_count)]).await?;

    write_with_deadline(stream, &[VERSION, METHOD_NO_AUTH]).await
}

async fn read_request(stream: &mut TcpStream) -> Result<Request> {
    let mut head = [0u8; 4];
    read_with_deadline(stream, &mut head).await?;

    let [_, command, _, address_type] = head;

    let host = match address_type {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            read_with_deadline(stream, &mut octets).await?;

            IpAddr::from(Ipv4Addr::from(octets)).to_string()
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            read_with_deadline(stream, &mut octets).await?;

            format!("[{}]", Ipv6Addr::from(octets))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            read_with_deadline(stream, &mut len).await?;

            let mut name = vec![0u8; usize::from(len[0])];
            read_with_deadline(stream, &mut name).await?;

            String::from_utf8(name)
                .map_err(|_| Error::handshake("domain name is not valid utf-8"))?
        }
        other => {
            let _ = send_reply(stream, REP_ADDRESS_TYPE_NOT_SUPPORTED).await;
            return Err(Error::handshake(format!("unsupported address type {other}")));
        }
    };

    let mut port = [0u8; 2];
    read_with_deadline(stream, &mut port).await?;
    let port = u16::from_be_bytes(port);

    Ok(Request {
        command,
        destination: format!("{host}:{port}"),
    })
}

async fn read_with_deadline(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    match timeout(HANDSHAKE_TIMEOUT, stream.read_exact(buf)).await {
        Ok(result) => {
            result?;
            Ok(())
        }
        Err(_) => Err(Error::Timeout),
    }
}

async fn write_with_deadline(stream: &mut TcpStream, buf: &[u8]) -> Result<()> {
    match timeout(HANDSHAKE_TIMEOUT, stream.write_all(buf)).await {
        Ok(result) => {
            result?;
            Ok(())
        }
        Err(_) => Err(Error::Timeout),
    }
}
