use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::fingerprint::NormalizedFeatures;
use crate::situation::{ActionKind, Decision, Situation};
use crate::strength::monte_carlo_equity;

/// Cheapest tier: pure threshold rules over the normalized features. Never
/// suspends, never fails, always yields a legal action, so the router can
/// fall back to it under any deadline.
pub fn cheap_decision(features: &NormalizedFeatures, situation: &Situation) -> Decision {
    let strength = features.strength_bucket as f64 / 10.0;

    if situation.to_call <= 0.0 {
        if features.strength_bucket >= 8 {
            let bet = (situation.pot * 0.75).max(situation.big_blind);
            let bet = bet.min(situation.effective_stack());
            return Decision::new(ActionKind::Raise, Some(bet), 0.55)
                .with_reasoning("strong hand, free action: value bet");
        }
        return Decision::new(ActionKind::Check, None, 0.6)
            .with_reasoning("no bet to face: check");
    }

    let pot_odds = situation.to_call / (situation.pot + situation.to_call);
    if situation.to_call >= situation.effective_stack() && features.strength_bucket >= 8 {
        return Decision::new(ActionKind::AllIn, Some(situation.effective_stack()), 0.6)
            .with_reasoning("strong hand, short stack: commit");
    }
    if strength >= pot_odds + 0.1 {
        return Decision::new(ActionKind::Call, Some(situation.to_call), 0.55)
            .with_reasoning("price is right against required equity");
    }
    Decision::new(ActionKind::Fold, None, 0.6).with_reasoning("insufficient equity for the price")
}

/// Shared EV comparison used by the moderate tier and the local deep
/// provider: seeded Monte Carlo equity plugged into fold/call/raise EV
/// arithmetic. Deterministic for a given seed.
pub fn simulated_decision(
    situation: &Situation,
    samples: u32,
    seed: u64,
    confidence_cap: f32,
) -> Decision {
    let mut rng = StdRng::seed_from_u64(seed);
    let opponents = situation.active_players().saturating_sub(1).max(1);
    let equity = monte_carlo_equity(
        &situation.hole_cards,
        &situation.board,
        opponents,
        samples,
        &mut rng,
    );

    let pot = situation.pot;
    let to_call = situation.to_call;
    let effective = situation.effective_stack();

    let mut candidates: Vec<(ActionKind, Option<f64>, f64)> = Vec::with_capacity(3);

    if to_call <= 0.0 {
        let check_ev = (2.0 * equity - 1.0) * pot;
        candidates.push((ActionKind::Check, None, check_ev));
    } else {
        candidates.push((ActionKind::Fold, None, 0.0));
        let call_ev = equity * (pot + to_call) - (1.0 - equity) * to_call;
        candidates.push((ActionKind::Call, Some(to_call), call_ev));
    }

    let raise_to = if to_call > 0.0 {
        (to_call * 2.5).max(situation.big_blind * 2.5)
    } else {
        (pot * 0.75).max(situation.big_blind)
    };
    let raise_to = raise_to.min(effective);
    if raise_to > to_call {
        let fold_prob = (0.3 + (0.5 - equity) * 0.2).clamp(0.05, 0.6);
        let raise_ev = fold_prob * pot
            + (1.0 - fold_prob) * (equity * (pot + 2.0 * raise_to) - (1.0 - equity) * raise_to);
        if raise_to >= effective {
            candidates.push((ActionKind::AllIn, Some(effective), raise_ev));
        } else {
            candidates.push((ActionKind::Raise, Some(raise_to), raise_ev));
        }
    }

    let (best_idx, best_ev) = candidates
        .iter()
        .enumerate()
        .map(|(i, (_, _, ev))| (i, *ev))
        .fold((0, f64::NEG_INFINITY), |acc, item| {
            if item.1 > acc.1 { item } else { acc }
        });
    let runner_up = candidates
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best_idx)
        .map(|(_, (_, _, ev))| *ev)
        .fold(f64::NEG_INFINITY, f64::max);

    // Confidence grows with the EV margin over the runner-up, scaled by pot.
    let margin = if runner_up.is_finite() {
        ((best_ev - runner_up) / pot.max(1.0)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let confidence = (0.55 + 0.4 * margin as f32).min(confidence_cap);

    let (action, amount, _) = candidates[best_idx].clone();
    Decision::new(action, amount, confidence).with_reasoning(format!(
        "simulated equity {:.2} over {} samples",
        equity, samples
    ))
}

/// Moderate tier: local seeded simulation at a modest sample count.
pub fn moderate_decision(situation: &Situation, samples: u32, seed: u64) -> Decision {
    simulated_decision(situation, samples, seed, 0.75)
}
