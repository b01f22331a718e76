/// Outbound status channel for one run: short human-readable text such as
/// "Thinking..." or an error diagnostic. Fire-and-forget; nothing is returned.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, text: &str);
}
