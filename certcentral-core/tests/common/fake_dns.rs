//! A minimal UDP DNS stub answering TXT queries from an in-memory map, so
//! `Dns01Fulfiller`'s real propagation-polling code (`wait_for_propagation`,
//! which otherwise queries real authoritative nameservers on port 53) can
//! be exercised against a loopback server under test control instead.
//!
//! Speaks just enough RFC 1035 wire format for a single-question query and
//! a single-answer TXT response: the question section is copied verbatim
//! from the request (so its encoding never needs to be produced by hand),
//! and the qname is decoded only far enough to key the record lookup.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;

/// Shared TXT-record backing store queried by the stub server and written
/// to by [`FakeDnsProvider`]. Keys are the owner name without a trailing
/// dot, lowercased.
pub type FakeDnsRecords = Arc<Mutex<HashMap<String, String>>>;

/// Starts the stub server on a loopback ephemeral port and returns its
/// address plus the shared record map callers mutate to control what it
/// answers.
pub async fn spawn() -> (SocketAddr, FakeDnsRecords) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind loopback udp socket");
    let addr = socket.local_addr().expect("udp socket has a local address");
    let records: FakeDnsRecords = Arc::new(Mutex::new(HashMap::new()));

    let records_for_task = records.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else { return };
            if let Some(response) = build_response(&buf[..len], &records_for_task) {
                let _ = socket.send_to(&response, peer).await;
            }
        }
    });

    (addr, records)
}

fn build_response(request: &[u8], records: &FakeDnsRecords) -> Option<Vec<u8>> {
    if request.len() < 12 {
        return None;
    }
    let qname = decode_qname(request, 12)?;
    let qend = question_end(request, 12)?;

    let value = records.lock().unwrap().get(&qname).cloned();

    let mut response = Vec::with_capacity(64);
    response.extend_from_slice(&request[0..2]); // ID
    response.extend_from_slice(&[0x81, 0x80]); // QR=1, RD=1, RA=1, RCODE=0
    response.extend_from_slice(&request[4..6]); // QDCOUNT, echoed
    response.extend_from_slice(&(if value.is_some() { 1u16 } else { 0u16 }).to_be_bytes()); // ANCOUNT
    response.extend_from_slice(&[0, 0]); // NSCOUNT
    response.extend_from_slice(&[0, 0]); // ARCOUNT
    response.extend_from_slice(&request[12..qend]); // question, verbatim

    if let Some(value) = value {
        response.extend_from_slice(&[0xC0, 0x0C]); // name = pointer to question
        response.extend_from_slice(&16u16.to_be_bytes()); // TYPE TXT
        response.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
        response.extend_from_slice(&60u32.to_be_bytes()); // TTL
        let mut rdata = Vec::new();
        for chunk in value.as_bytes().chunks(255) {
            rdata.push(chunk.len() as u8);
            rdata.extend_from_slice(chunk);
        }
        response.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        response.extend_from_slice(&rdata);
    }

    Some(response)
}

/// Finds the byte offset just past the question section (name + QTYPE +
/// QCLASS) starting at `start`.
fn question_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    loop {
        let len = *buf.get(i)? as usize;
        i += 1;
        if len == 0 {
            break;
        }
        i += len;
        if i > buf.len() {
            return None;
        }
    }
    i += 4; // QTYPE + QCLASS
    if i > buf.len() {
        return None;
    }
    Some(i)
}

/// Decodes the dotted qname at `start`, lowercased, without a trailing dot.
fn decode_qname(buf: &[u8], start: usize) -> Option<String> {
    let mut labels = Vec::new();
    let mut i = start;
    loop {
        let len = *buf.get(i)? as usize;
        i += 1;
        if len == 0 {
            break;
        }
        let label = buf.get(i..i + len)?;
        labels.push(std::str::from_utf8(label).ok()?.to_ascii_lowercase());
        i += len;
    }
    Some(labels.join("."))
}
