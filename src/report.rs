/// Separates *what* a diagnostic says from *where it goes*. A single string
/// message per report is enough here since this VM's three outcome kinds
/// already carry their own phase information in the message text, letting
/// a test module swap in a collecting reporter instead of stderr.
pub trait Reporter {
    fn report(&mut self, message: &str);
}

pub struct CliReporter;

impl Reporter for CliReporter {
    fn report(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

#[derive(Default)]
pub struct CollectingReporter {
    pub messages: Vec<String>,
}

impl Reporter for CollectingReporter {
    fn report(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}
