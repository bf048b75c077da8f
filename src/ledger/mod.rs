//! Carryforward ledgers for business losses and MAT credit
//!
//! Both chains hold slots ordered most-recent-first. A pass draws on the
//! oldest usable slot first and stops when the available amount runs out.
//! Slot `i` (1-based) is usable only while the carry-forward limit is at
//! least `i`. After the pass every remaining balance ages by one slot, a
//! fresh amount enters slot 1 and the oldest slot falls out of the window.

/// Loss chain length
pub const LOSS_SLOTS: usize = 8;

/// MAT credit chain length
pub const MAT_SLOTS: usize = 10;

/// Amounts drawn from each slot in one pass
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDraw {
    /// Drawn per slot, same order as the input slots
    pub used: Vec<f64>,
    /// Available amount left after the pass
    pub remaining: f64,
}

impl WindowDraw {
    pub fn total(&self) -> f64 {
        self.used.iter().sum()
    }
}

/// Draw `available` against `slots`, oldest usable slot first
///
/// Negative balances are never drawn, so the total drawn cannot exceed
/// either the available amount or the sum of positive balances.
pub fn draw_window(slots: &[f64], limit: usize, available: f64) -> WindowDraw {
    let mut remaining = available.max(0.0);
    let mut used = vec![0.0; slots.len()];
    for i in (1..=slots.len()).rev() {
        if limit >= i {
            let take = remaining.min(slots[i - 1].max(0.0));
            used[i - 1] = take;
            remaining -= take;
        }
    }
    WindowDraw { used, remaining }
}

/// Next year's slots: `fresh` first, then each balance moved one slot older
pub fn age_window(slots: &[f64], used: &[f64], fresh: f64) -> Vec<f64> {
    let mut next = Vec::with_capacity(slots.len());
    if slots.is_empty() {
        return next;
    }
    next.push(fresh);
    next.extend(
        slots
            .iter()
            .zip(used)
            .take(slots.len() - 1)
            .map(|(s, u)| s - u),
    );
    next
}

/// Loss set-off for one entity in one year
#[derive(Debug, Clone, PartialEq)]
pub struct LossStep {
    /// Income left after current and brought-forward losses
    pub gti: f64,
    /// Loss generated this year (slot 1 next year)
    pub new_loss: f64,
    pub used: Vec<f64>,
    /// Full chain for next year, `newloss1..W`
    pub next_slots: Vec<f64>,
}

/// Absorb current-year and brought-forward losses into income
///
/// When current losses exceed income the shortfall becomes the fresh loss
/// and no brought-forward slot is touched.
pub fn loss_step(gti_before_loss: f64, cy_losses: f64, slots: &[f64], limit: usize) -> LossStep {
    let gti_after_cy = (gti_before_loss - cy_losses).max(0.0);
    let new_loss = gti_after_cy - gti_before_loss + cy_losses;
    let draw = draw_window(slots, limit, gti_after_cy);
    let next_slots = age_window(slots, &draw.used, new_loss);
    LossStep {
        gti: draw.remaining,
        new_loss,
        used: draw.used,
        next_slots,
    }
}

/// MAT liability and credit for one entity in one year
#[derive(Debug, Clone, PartialEq)]
pub struct MatStep {
    /// Final liability: the larger of normal tax and MAT
    pub citax: f64,
    /// Credit generated this year
    pub credit: f64,
    pub used: Vec<f64>,
    /// Full chain for next year, `NEW_MAT_CR1..W`
    pub next_slots: Vec<f64>,
}

impl MatStep {
    pub fn utilized(&self) -> f64 {
        self.used.iter().sum()
    }
}

/// Compare normal tax with MAT and move the credit chain
///
/// If MAT is higher the excess becomes the freshest credit and no existing
/// credit is drawn. Otherwise credits are drawn against the liability.
pub fn mat_step(normal_tax: f64, mat_tax: f64, slots: &[f64], limit: usize) -> MatStep {
    let citax = normal_tax.max(mat_tax);
    if mat_tax > normal_tax {
        let credit = mat_tax - normal_tax;
        let used = vec![0.0; slots.len()];
        let next_slots = age_window(slots, &used, credit);
        MatStep {
            citax,
            credit,
            used,
            next_slots,
        }
    } else {
        let draw = draw_window(slots, limit, citax);
        let next_slots = age_window(slots, &draw.used, 0.0);
        MatStep {
            citax,
            credit: 0.0,
            used: draw.used,
            next_slots,
        }
    }
}
