//! Encoding of qdisc parameters into `tc` arguments.
//!
//! Integer options are written in base 10, probabilities and correlations with six fractional
//! digits. Options whose value is zero are left out, together with the options that only make
//! sense after them (e.g. jitter without a delay).

use crate::rule::{Netem, Tbf};

/// Encodes `netem` options in the order `tc` documents them.
pub fn netem_args(netem: &Netem) -> Vec<String> {
    let mut args = Vec::new();

    if netem.delay > 0 {
        args.push("delay".to_string());
        args.push(netem.delay.to_string());

        if netem.jitter > 0 {
            args.push(netem.jitter.to_string());

            if netem.delay_corr > 0.0 {
                args.push(float(netem.delay_corr));
            }
        }

        // reordering is not possible without some delay
        if netem.reorder > 0.0 {
            push_probability(&mut args, "reorder", netem.reorder, netem.reorder_corr);

            if netem.gap > 0 {
                args.push("gap".to_string());
                args.push(netem.gap.to_string());
            }
        }
    }

    if netem.limit > 0 {
        args.push("limit".to_string());
        args.push(netem.limit.to_string());
    }

    push_probability(&mut args, "loss", netem.loss, netem.loss_corr);
    push_probability(&mut args, "duplicate", netem.duplicate, netem.duplicate_corr);
    push_probability(&mut args, "corrupt", netem.corrupt, netem.corrupt_corr);

    args
}

/// Encodes `tbf` options. Rate and burst are mandatory, the peak rate bucket reuses `min_burst`
/// as its MTU.
pub fn tbf_args(tbf: &Tbf) -> Vec<String> {
    let mut args =
        vec!["rate".to_string(), tbf.rate.to_string(), "burst".to_string(), tbf.burst.to_string()];

    if tbf.limit > 0 {
        args.push("limit".to_string());
        args.push(tbf.limit.to_string());
    }

    if tbf.peak_rate > 0 {
        args.push("peakrate".to_string());
        args.push(tbf.peak_rate.to_string());
        args.push("mtu".to_string());
        args.push(tbf.min_burst.to_string());
    }

    args
}

/// Encodes `prio` options.
pub fn prio_args(bands: u16, priomap: &[u8; 16]) -> Vec<String> {
    let mut args = Vec::with_capacity(3 + priomap.len());
    args.push("bands".to_string());
    args.push(bands.to_string());
    args.push("priomap".to_string());
    args.extend(priomap.iter().map(u8::to_string));
    args
}

fn push_probability(args: &mut Vec<String>, name: &str, probability: f32, correlation: f32) {
    if probability.is_nan() || probability <= 0.0 {
        return;
    }

    args.push(name.to_string());
    args.push(float(probability));

    if correlation > 0.0 {
        args.push(float(correlation));
    }
}

fn float(value: f32) -> String {
    format!("{value:.6}")
}
