use std::{
    collections::HashMap,
    fmt,
    time::{Duration, Instant},
};

use crate::floating_type_mod::FT;

#[derive(Clone)]
pub struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}

impl<T> Counter<T> {
    pub fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }

    pub fn add_value(&mut self, v: T) {
        self.values.push(v);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl Counter<FT> {
    pub fn avg(&self) -> FT {
        if self.values.is_empty() {
            return 0.;
        }
        self.values.iter().cloned().sum::<FT>() / self.values.len() as FT
    }

    pub fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::MAX, FT::min)
    }

    pub fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::MIN, FT::max)
    }

    pub fn sum(&self) -> FT {
        self.values.iter().cloned().sum()
    }
}

impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    pub fn avg(&self) -> Duration {
        if self.values.is_empty() {
            return Duration::ZERO;
        }
        self.sum() / self.values.len() as u32
    }

    pub fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

/**
 * Named series of scalar values, e.g. the solver iterations of every step.
 */
pub struct ValueCounters {
    counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}

impl ValueCounters {
    pub fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    pub fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Counter<FT>> {
        self.counters.get(id)
    }

    fn sorted(&self) -> Vec<(&String, &Counter<FT>)> {
        let mut v: Vec<_> = self.counters.iter().collect();
        v.sort_by(|x, y| x.0.cmp(y.0));
        v
    }
}

/**
 * Named wall clock timers. `begin(id)` and `end(id)` enclose one measurement.
 */
pub struct PerformanceCounters {
    counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}

impl PerformanceCounters {
    pub fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    pub fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }

    pub fn end(&mut self, id: &str) {
        if self.enabled {
            if let Some(counter) = self.counters.get_mut(id) {
                counter.end();
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Counter<Duration>> {
        self.counters.get(id)
    }

    fn sorted(&self) -> Vec<(&String, &Counter<Duration>)> {
        let mut v: Vec<_> = self.counters.iter().collect();
        v.sort_by(|x, y| x.0.cmp(y.0));
        v
    }
}

pub struct Statistics<'a> {
    pub pcounters: &'a PerformanceCounters,
    pub vcounters: &'a ValueCounters,
}

impl<'a> fmt::Display for Statistics<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, pcounter) in self.pcounters.sorted() {
            writeln!(
                f,
                "{}: avg:{:.3}ms total:{:.3}ms",
                label,
                pcounter.avg().as_secs_f64() * 1000.,
                pcounter.sum().as_secs_f64() * 1000.
            )?;
        }
        writeln!(f)?;

        for (label, vcounter) in self.vcounters.sorted() {
            writeln!(
                f,
                "{}: min:{} max:{} avg:{} sum:{}",
                label,
                vcounter.min(),
                vcounter.max(),
                vcounter.avg(),
                vcounter.sum()
            )?;
        }
        Ok(())
    }
}

pub fn write_statistics(pcounters: &PerformanceCounters, vcounters: &ValueCounters) -> String {
    Statistics { pcounters, vcounters }.to_string()
}

#[test]
fn disabled_counters_record_nothing() {
    let mut vcounters = ValueCounters::new(false);
    vcounters.add_value("iterations", 3.);
    assert!(vcounters.get("iterations").is_none());

    let mut pcounters = PerformanceCounters::new(false);
    pcounters.begin("solve");
    pcounters.end("solve");
    assert!(pcounters.get("solve").is_none());
}

#[test]
fn value_counters_aggregate() {
    let mut vcounters = ValueCounters::new(true);
    for v in [2., 4., 9.] {
        vcounters.add_value("iterations", v);
    }
    let c = vcounters.get("iterations").unwrap();
    assert_eq!(c.len(), 3);
    assert_eq!(c.min(), 2.);
    assert_eq!(c.max(), 9.);
    assert_eq!(c.avg(), 5.);
    assert_eq!(c.sum(), 15.);

    let mut pcounters = PerformanceCounters::new(true);
    pcounters.begin("solve");
    pcounters.end("solve");
    assert_eq!(pcounters.get("solve").map(|c| c.len()), Some(1));

    let s = write_statistics(&pcounters, &vcounters);
    assert!(s.contains("solve: avg:"));
    assert!(s.contains("iterations: min:2 max:9 avg:5 sum:15"));
}
