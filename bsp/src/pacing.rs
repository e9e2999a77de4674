/// Called between batches of a long parse so a host can get a word in.
///
/// `done` of `total` items of `stage` are finished.
pub trait Pacer {
    fn pace(&mut self, stage: &str, done: usize, total: usize);
}

/// Runs the parse straight through.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoPacing;

impl Pacer for NoPacing {
    fn pace(&mut self, _stage: &str, _done: usize, _total: usize) {}
}

/// Logs progress at trace level.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogPacing;

impl Pacer for LogPacing {
    fn pace(&mut self, stage: &str, done: usize, total: usize) {
        log::trace!("{stage}: {done}/{total}");
    }
}

impl<F: FnMut(&str, usize, usize)> Pacer for F {
    fn pace(&mut self, stage: &str, done: usize, total: usize) {
        self(stage, done, total)
    }
}

/// Calls a pacer every `interval` items.
pub(crate) struct Batches<'a> {
    pacer: &'a mut dyn Pacer,
    interval: usize,
}

impl<'a> Batches<'a> {
    pub fn new(pacer: &'a mut dyn Pacer, interval: usize) -> Self {
        Self { pacer, interval }
    }

    pub fn tick(&mut self, stage: &str, done: usize, total: usize) {
        if self.interval > 0 && done > 0 && done % self.interval == 0 {
            self.pacer.pace(stage, done, total);
        }
    }

    pub fn finish(&mut self, stage: &str, total: usize) {
        self.pacer.pace(stage, total, total);
    }
}

#[cfg(test)]
mod pacing_tests {
    use super::*;

    #[test]
    fn ticks_every_interval_then_finishes() {
        let mut calls = Vec::new();
        let mut record = |stage: &str, done: usize, total: usize| {
            calls.push((stage.to_owned(), done, total));
        };
        let mut batches = Batches::new(&mut record, 4);
        for i in 0..10 {
            batches.tick("faces", i, 10);
        }
        batches.finish("faces", 10);
        let done: Vec<_> = calls.iter().map(|c| c.1).collect();
        assert_eq!(done, vec![4, 8, 10]);
    }

    #[test]
    fn zero_interval_only_finishes() {
        let mut count = 0;
        let mut record = |_: &str, _: usize, _: usize| count += 1;
        let mut batches = Batches::new(&mut record, 0);
        for i in 0..100 {
            batches.tick("faces", i, 100);
        }
        batches.finish("faces", 100);
        assert_eq!(count, 1);
        let mut none = NoPacing;
        none.pace("faces", 1, 1);
    }
}
