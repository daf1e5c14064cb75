use crate::Envelope;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenPort { name: String, toggled: u64 },
    SendRequest { toggled: u64, envelope: Envelope },
    ClosePort { toggled: u64 },
}
