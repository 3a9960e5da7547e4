//! `indicatif`-backed implementation of the archive layer's `Progress`
//! trait: one progress bar per entry, reused across entries via a
//! shared `MultiProgress` area. The receiver variant also owns the
//! spinner shown while it is still looking for the sender (spec.md §6):
//! the spinner is cleared the moment the first archive entry starts.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use p2pxfer::archive::Progress;

pub struct IndicatifProgress {
    multi: MultiProgress,
    current: Option<ProgressBar>,
    spinner: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        IndicatifProgress {
            multi: MultiProgress::new(),
            current: None,
            spinner: None,
        }
    }

    pub fn new_receiver() -> Self {
        let multi = MultiProgress::new();
        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_message("looking for sender...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(120));
        IndicatifProgress {
            multi,
            current: None,
            spinner: Some(spinner),
        }
    }
}

impl Progress for IndicatifProgress {
    fn start_entry(&mut self, name: &str, total: u64) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        let bar = self.multi.add(ProgressBar::new(total));
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(name.to_string());
        self.current = Some(bar);
    }

    fn advance(&mut self, bytes: u64) {
        if let Some(bar) = &self.current {
            bar.inc(bytes);
        }
    }

    fn finish_entry(&mut self) {
        if let Some(bar) = self.current.take() {
            bar.finish_and_clear();
        }
    }
}
