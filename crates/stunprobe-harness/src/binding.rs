//! Minimal STUN binding responder codec.
//!
//! Answers RFC 5389 binding requests with a success response carrying the
//! requester's transport address as both XOR-MAPPED-ADDRESS and the legacy
//! MAPPED-ADDRESS. Anything else is ignored.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const MAGIC_COOKIE: u32 = 0x2112_A442;
const HEADER_LEN: usize = 20;

const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS: u16 = 0x0101;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const FAMILY_V4: u8 = 0x01;
const FAMILY_V6: u8 = 0x02;

/// Length of the first complete message in `buf`, if one has fully arrived.
///
/// Stream transports carry messages back to back; the header's length field
/// delimits them.
pub(crate) fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let total = HEADER_LEN + usize::from(u16::from_be_bytes([buf[2], buf[3]]));
    (buf.len() >= total).then_some(total)
}

/// Build the success response to a binding request received from `source`.
///
/// Returns `None` for anything that is not a well-formed binding request.
pub(crate) fn respond(request: &[u8], source: SocketAddr) -> Option<Vec<u8>> {
    let len = frame_len(request)?;
    let msg_type = u16::from_be_bytes([request[0], request[1]]);
    let cookie = u32::from_be_bytes([request[4], request[5], request[6], request[7]]);
    if msg_type != BINDING_REQUEST || cookie != MAGIC_COOKIE || len % 4 != 0 {
        return None;
    }

    let mut txn_id = [0u8; 12];
    txn_id.copy_from_slice(&request[8..HEADER_LEN]);

    let mut attrs = Vec::with_capacity(48);
    push_address(&mut attrs, ATTR_XOR_MAPPED_ADDRESS, xor_address(source, &txn_id));
    push_address(&mut attrs, ATTR_MAPPED_ADDRESS, source);

    let attrs_len = u16::try_from(attrs.len()).ok()?;
    let mut msg = Vec::with_capacity(HEADER_LEN + attrs.len());
    msg.extend_from_slice(&BINDING_SUCCESS.to_be_bytes());
    msg.extend_from_slice(&attrs_len.to_be_bytes());
    msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    msg.extend_from_slice(&txn_id);
    msg.extend_from_slice(&attrs);
    Some(msg)
}

// XOR-MAPPED-ADDRESS masks the port with the cookie's high half and the
// address with the cookie, followed by the transaction ID for IPv6.
fn xor_address(addr: SocketAddr, txn_id: &[u8; 12]) -> SocketAddr {
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let ip = match addr.ip() {
        IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) ^ MAGIC_COOKIE)),
        IpAddr::V6(v6) => {
            let mut mask = [0u8; 16];
            mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..].copy_from_slice(txn_id);
            let mut octets = v6.octets();
            octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
            IpAddr::from(octets)
        },
    };
    SocketAddr::new(ip, port)
}

fn push_address(out: &mut Vec<u8>, attr: u16, addr: SocketAddr) {
    let (family, octets): (u8, Vec<u8>) = match addr.ip() {
        IpAddr::V4(v4) => (FAMILY_V4, v4.octets().to_vec()),
        IpAddr::V6(v6) => (FAMILY_V6, v6.octets().to_vec()),
    };
    // 4 + 16 at most, always a multiple of four: no padding needed.
    let value_len = 4 + octets.len() as u16;

    out.extend_from_slice(&attr.to_be_bytes());
    out.extend_from_slice(&value_len.to_be_bytes());
    out.push(0);
    out.push(family);
    out.extend_from_slice(&addr.port().to_be_bytes());
    out.extend_from_slice(&octets);
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::Ipv6Addr;

    use super::*;

    pub(crate) fn binding_request(txn_id: [u8; 12]) -> Vec<u8> {
        let mut msg = Vec::with_capacity(HEADER_LEN);
        msg.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
        msg.extend_from_slice(&0u16.to_be_bytes());
        msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        msg.extend_from_slice(&txn_id);
        msg
    }

    /// Decode the XOR-MAPPED-ADDRESS of a success response.
    pub(crate) fn mapped_address(response: &[u8]) -> Option<SocketAddr> {
        let msg_type = u16::from_be_bytes([response[0], response[1]]);
        if msg_type != BINDING_SUCCESS || frame_len(response)? != response.len() {
            return None;
        }
        let mut txn_id = [0u8; 12];
        txn_id.copy_from_slice(&response[8..HEADER_LEN]);

        let mut pos = HEADER_LEN;
        while pos + 4 <= response.len() {
            let attr = u16::from_be_bytes([response[pos], response[pos + 1]]);
            let len = usize::from(u16::from_be_bytes([response[pos + 2], response[pos + 3]]));
            let value = &response[pos + 4..pos + 4 + len];
            if attr == ATTR_XOR_MAPPED_ADDRESS {
                let port = u16::from_be_bytes([value[2], value[3]]);
                let ip = match value[1] {
                    FAMILY_V4 => IpAddr::from(<[u8; 4]>::try_from(&value[4..8]).ok()?),
                    _ => IpAddr::from(<[u8; 16]>::try_from(&value[4..20]).ok()?),
                };
                // Masking is its own inverse.
                return Some(xor_address(SocketAddr::new(ip, port), &txn_id));
            }
            pos += 4 + len;
        }
        None
    }

    #[test]
    fn ipv4_source_is_reflected() {
        let source = SocketAddr::new(Ipv4Addr::new(192, 168, 1, 1).into(), 54321);
        let response = respond(&binding_request([7; 12]), source).expect("binding request");

        assert_eq!(&response[0..2], &BINDING_SUCCESS.to_be_bytes());
        assert_eq!(&response[8..20], &[7; 12]);
        assert_eq!(frame_len(&response), Some(response.len()));
        assert_eq!(mapped_address(&response), Some(source));

        // The raw attribute is masked, not the plain address.
        assert_eq!(&response[24..26], &[0, FAMILY_V4]);
        assert_eq!(u16::from_be_bytes([response[26], response[27]]), 54321 ^ 0x2112);
    }

    #[test]
    fn ipv6_source_uses_transaction_id_in_mask() {
        let source = SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 3478);
        let txn_id = [0xAB; 12];
        let response = respond(&binding_request(txn_id), source).expect("binding request");

        assert_eq!(mapped_address(&response), Some(source));
        // Last address octet: 0x01 ^ final transaction ID byte.
        assert_eq!(response[43], 0x01 ^ 0xAB);
    }

    #[test]
    fn non_binding_messages_are_ignored() {
        let source = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 1);

        assert_eq!(respond(&[0u8; 8], source), None);

        let mut wrong_cookie = binding_request([1; 12]);
        wrong_cookie[4] = 0;
        assert_eq!(respond(&wrong_cookie, source), None);

        let mut indication = binding_request([1; 12]);
        indication[1] = 0x11;
        assert_eq!(respond(&indication, source), None);
    }

    #[test]
    fn frames_wait_for_the_whole_message() {
        let mut request = binding_request([2; 12]);
        request[3] = 8;
        assert_eq!(frame_len(&request), None);

        request.extend_from_slice(&[0u8; 8]);
        request.extend_from_slice(&binding_request([3; 12]));
        assert_eq!(frame_len(&request), Some(28));
    }
}
