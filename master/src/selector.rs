//! Multicast target selection for the aggressive asynchronous mode.

use rand::{SeedableRng, rngs::StdRng, seq::index::sample};

/// Picks which peers should learn about a parameter update triggered by
/// a delta from `source`.
pub trait ReceiverSelector: Send {
    /// A subset of logical ids `0..n`, never containing `source`.
    fn targets(&mut self, source: usize) -> Vec<usize>;
}

/// Builds a selector from its config form: `["all"]`, `["ring", k]` or
/// `["random", k]` / `["random", k, seed]`.
///
/// # Errors
/// A human-readable message for unknown names or unparsable parameters;
/// the caller treats this as fatal.
pub fn from_conf(param: &[String], n_worker: usize) -> Result<Box<dyn ReceiverSelector>, String> {
    let name = param.first().map(String::as_str).unwrap_or_default();
    let count = |i: usize| -> Result<usize, String> {
        let k: usize = param
            .get(i)
            .ok_or("selector needs a target count")?
            .parse()
            .map_err(|e| format!("bad target count: {e}"))?;
        if k == 0 || k >= n_worker {
            return Err(format!(
                "target count must be in 1..{n_worker}, got {k}"
            ));
        }
        Ok(k)
    };

    match name {
        "all" => Ok(Box::new(AllSelector { n: n_worker })),
        "ring" => Ok(Box::new(RingSelector {
            n: n_worker,
            k: count(1)?,
        })),
        "random" => {
            let seed = match param.get(2) {
                Some(s) => s.parse().map_err(|e| format!("bad selector seed: {e}"))?,
                None => 1,
            };
            Ok(Box::new(RandomSelector {
                n: n_worker,
                k: count(1)?,
                rng: StdRng::seed_from_u64(seed),
            }))
        }
        other => Err(format!("unknown receiver selector: '{other}'")),
    }
}

/// Every peer except the sender.
struct AllSelector {
    n: usize,
}

impl ReceiverSelector for AllSelector {
    fn targets(&mut self, source: usize) -> Vec<usize> {
        (0..self.n).filter(|&w| w != source).collect()
    }
}

/// The `k` peers following the sender on the logical ring.
struct RingSelector {
    n: usize,
    k: usize,
}

impl ReceiverSelector for RingSelector {
    fn targets(&mut self, source: usize) -> Vec<usize> {
        (1..=self.k).map(|step| (source + step) % self.n).collect()
    }
}

/// `k` distinct peers drawn uniformly, excluding the sender.
struct RandomSelector {
    n: usize,
    k: usize,
    rng: StdRng,
}

impl ReceiverSelector for RandomSelector {
    fn targets(&mut self, source: usize) -> Vec<usize> {
        // sample from the ring positions after `source` so the sender can
        // never be drawn
        sample(&mut self.rng, self.n - 1, self.k)
            .iter()
            .map(|offset| (source + 1 + offset) % self.n)
            .collect()
    }
}
