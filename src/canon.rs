//! Canonical Sign-In-With-Solana message text.
//!
//! Signer and verifier must agree on these bytes exactly, so both
//! [`sign_in_message_text`] and [`parse_sign_in_message`] follow the
//! wallet-standard layout line for line.

use crate::types::SignInInput;

const HEADER_SUFFIX: &str = " wants you to sign in with your Solana account:";

const FIELD_LABELS: [&str; 8] = [
    "URI",
    "Version",
    "Chain ID",
    "Nonce",
    "Issued At",
    "Expiration Time",
    "Not Before",
    "Request ID",
];

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

fn field_values(input: &SignInInput) -> [&Option<String>; 8] {
    [
        &input.uri,
        &input.version,
        &input.chain_id,
        &input.nonce,
        &input.issued_at,
        &input.expiration_time,
        &input.not_before,
        &input.request_id,
    ]
}

fn field_slot<'a>(input: &'a mut SignInInput, index: usize) -> &'a mut Option<String> {
    match index {
        0 => &mut input.uri,
        1 => &mut input.version,
        2 => &mut input.chain_id,
        3 => &mut input.nonce,
        4 => &mut input.issued_at,
        5 => &mut input.expiration_time,
        6 => &mut input.not_before,
        _ => &mut input.request_id,
    }
}

/// Render `input` as the text a signer signs. The header always names
/// `address`, the signing account; a pinned `input.address` is checked by
/// the verifier, never rendered in place of the signer.
pub fn sign_in_message_text(input: &SignInInput, address: &str) -> String {
    let mut message = format!("{}{HEADER_SUFFIX}\n{address}", input.domain);

    if let Some(statement) = present(&input.statement) {
        message.push_str("\n\n");
        message.push_str(statement);
    }

    let mut fields: Vec<String> = FIELD_LABELS
        .iter()
        .zip(field_values(input))
        .filter_map(|(label, value)| present(value).map(|v| format!("{label}: {v}")))
        .collect();
    if !input.resources.is_empty() {
        fields.push("Resources:".to_string());
        fields.extend(input.resources.iter().map(|r| format!("- {r}")));
    }

    if !fields.is_empty() {
        message.push_str("\n\n");
        message.push_str(&fields.join("\n"));
    }
    message
}

pub fn canonical_message(input: &SignInInput, address: &str) -> Vec<u8> {
    sign_in_message_text(input, address).into_bytes()
}

fn is_field_line(line: &str) -> bool {
    line == "Resources:"
        || line
            .split_once(": ")
            .is_some_and(|(label, _)| FIELD_LABELS.contains(&label))
}

/// Parse signed bytes back into the challenge they encode. Returns `None`
/// for anything [`sign_in_message_text`] could not have produced.
pub fn parse_sign_in_message(bytes: &[u8]) -> Option<SignInInput> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut lines = text.split('\n');

    let domain = lines.next()?.strip_suffix(HEADER_SUFFIX)?;
    let address = lines.next()?;
    if domain.is_empty() || address.is_empty() {
        return None;
    }
    let mut out = SignInInput {
        domain: domain.to_string(),
        address: Some(address.to_string()),
        ..Default::default()
    };

    let rest: Vec<&str> = lines.collect();
    if rest.is_empty() {
        return Some(out);
    }
    if !rest[0].is_empty() {
        return None;
    }

    let mut i = 1;
    let first = *rest.get(i)?;
    if !is_field_line(first) {
        out.statement = Some(first.to_string());
        i += 1;
        if i == rest.len() {
            return Some(out);
        }
        if !rest[i].is_empty() || i + 1 == rest.len() {
            return None;
        }
        i += 1;
    }

    let mut next_label = 0;
    while i < rest.len() {
        let line = rest[i];
        if line == "Resources:" {
            for resource in &rest[i + 1..] {
                out.resources.push(resource.strip_prefix("- ")?.to_string());
            }
            if out.resources.is_empty() {
                return None;
            }
            break;
        }
        let (label, value) = line.split_once(": ")?;
        // labels must appear in canonical order, each at most once
        let index = next_label + FIELD_LABELS[next_label..].iter().position(|l| *l == label)?;
        *field_slot(&mut out, index) = Some(value.to_string());
        next_label = index + 1;
        i += 1;
    }
    Some(out)
}
