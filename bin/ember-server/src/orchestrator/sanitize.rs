/// Light clean-up of model output before it is stored.
///
/// No HTML escaping happens here; rendering is the client's job.
pub fn sanitize_reply(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\t', "    ")
        .replace("...", "…")
        .replace("--", "—")
        .trim()
        .to_owned()
}
