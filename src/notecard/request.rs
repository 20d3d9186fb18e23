use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct Request<'a, B> {
    req: &'a str,
    body: B,
}

#[derive(Debug, Serialize)]
struct CardWriteBody<'a> {
    file: &'a str,
    data: &'a str,
}

/// Encodes a `card.write` request carrying a whole file, newline-terminated as
/// the Notecard expects.
pub fn card_write_request(file: &str, data: &str) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&Request {
        req: "card.write",
        body: CardWriteBody { file, data },
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Returns the `err` text of a Notecard reply, if the reply is a JSON object
/// carrying one. Anything else counts as an acceptance.
pub fn reply_error(reply: &str) -> Option<String> {
    let value: Value = serde_json::from_str(reply).ok()?;
    value.get("err")?.as_str().map(str::to_owned)
}
