use std::cmp::Ordering;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::cards::{standard_deck, Card, Rank};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum HandClass {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassedHand {
    pub class: HandClass,
    pub ranks: [u8; 5],
}

impl PartialOrd for ClassedHand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassedHand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.class
            .cmp(&other.class)
            .then_with(|| self.ranks.cmp(&other.ranks))
    }
}

fn fill(mut values: Vec<u8>) -> [u8; 5] {
    values.resize(5, 0);
    [values[0], values[1], values[2], values[3], values[4]]
}

fn classify_five(cards: &[Card; 5]) -> ClassedHand {
    let mut counts = [0u8; 15];
    let mut suits = [0u8; 4];
    let mut sorted_ranks: Vec<u8> = cards.iter().map(|c| c.rank_value()).collect();
    sorted_ranks.sort_unstable_by(|a, b| b.cmp(a));

    for card in cards {
        counts[card.rank_value() as usize] += 1;
        suits[card.suit.index()] += 1;
    }

    let is_flush = suits.contains(&5);

    let mut mask: u32 = 0;
    for rank_value in 2u8..=14 {
        if counts[rank_value as usize] > 0 {
            mask |= 1 << rank_value as u32;
            if rank_value == Rank::Ace.value() {
                mask |= 1 << 1; // Ace-low straight support
            }
        }
    }

    let mut straight_high = None;
    for high in (5u8..=14).rev() {
        let mut needed = 0u32;
        for i in 0..5u8 {
            needed |= 1 << (high - i) as u32;
        }
        if mask & needed == needed {
            straight_high = Some(high);
            break;
        }
    }

    let mut groups: Vec<(u8, u8)> = (2u8..=14)
        .filter_map(|rank| {
            let count = counts[rank as usize];
            if count > 0 { Some((count, rank)) } else { None }
        })
        .collect();
    groups.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    if is_flush {
        if let Some(high) = straight_high {
            return ClassedHand {
                class: HandClass::StraightFlush,
                ranks: fill(vec![high, high - 1, high - 2, high - 3, high - 4]),
            };
        }
    }

    if let Some(&(count, rank)) = groups.first() {
        match count {
            4 => {
                let kicker = groups
                    .iter()
                    .find(|(c, _)| *c == 1)
                    .map(|(_, r)| *r)
                    .unwrap_or(0);
                return ClassedHand {
                    class: HandClass::FourOfAKind,
                    ranks: fill(vec![rank, kicker]),
                };
            }
            3 => {
                if groups.get(1).map(|(c, _)| *c == 2).unwrap_or(false) {
                    return ClassedHand {
                        class: HandClass::FullHouse,
                        ranks: fill(vec![rank, groups[1].1]),
                    };
                }
            }
            _ => {}
        }
    }

    if is_flush {
        return ClassedHand {
            class: HandClass::Flush,
            ranks: fill(sorted_ranks.clone()),
        };
    }

    if let Some(high) = straight_high {
        return ClassedHand {
            class: HandClass::Straight,
            ranks: fill(vec![high, high - 1, high - 2, high - 3, high - 4]),
        };
    }

    if let Some(&(count, rank)) = groups.first() {
        match count {
            3 => {
                let mut kickers: Vec<u8> = groups
                    .iter()
                    .filter(|(c, _)| *c == 1)
                    .map(|(_, r)| *r)
                    .collect();
                kickers.sort_unstable_by(|a, b| b.cmp(a));
                let mut values = vec![rank];
                values.extend(kickers);
                return ClassedHand {
                    class: HandClass::ThreeOfAKind,
                    ranks: fill(values),
                };
            }
            2 => {
                if groups.get(1).map(|(c, _)| *c == 2).unwrap_or(false) {
                    let kicker = groups
                        .iter()
                        .find(|(c, _)| *c == 1)
                        .map(|(_, r)| *r)
                        .unwrap_or(0);
                    return ClassedHand {
                        class: HandClass::TwoPair,
                        ranks: fill(vec![rank, groups[1].1, kicker]),
                    };
                }
                let mut kickers: Vec<u8> = groups
                    .iter()
                    .filter(|(c, _)| *c == 1)
                    .map(|(_, r)| *r)
                    .collect();
                kickers.sort_unstable_by(|a, b| b.cmp(a));
                let mut values = vec![rank];
                values.extend(kickers);
                return ClassedHand {
                    class: HandClass::OnePair,
                    ranks: fill(values),
                };
            }
            _ => {}
        }
    }

    ClassedHand {
        class: HandClass::HighCard,
        ranks: fill(sorted_ranks),
    }
}

pub fn best_hand(cards: &[Card]) -> ClassedHand {
    debug_assert!(cards.len() >= 5, "at least 5 cards required");
    cards
        .iter()
        .copied()
        .combinations(5)
        .map(|combo| {
            let arr = [combo[0], combo[1], combo[2], combo[3], combo[4]];
            classify_five(&arr)
        })
        .max()
        .unwrap_or(ClassedHand {
            class: HandClass::HighCard,
            ranks: [0; 5],
        })
}

/// Deterministic 0..=100 strength score for a hole/board pair. Preflop uses
/// a static heuristic over ranks/suitedness; postflop scores the best made
/// hand with a kicker adjustment. The score feeds the normalizer's
/// bucketizer, so it must stay stable across releases of the same schema
/// version.
pub fn strength_score(hole: &[Card], board: &[Card]) -> u8 {
    if board.is_empty() {
        return preflop_score(hole);
    }
    let mut cards: Vec<Card> = hole.to_vec();
    cards.extend_from_slice(board);
    if cards.len() < 5 {
        return preflop_score(hole);
    }
    let made = best_hand(&cards);
    let base = made.class as u8 as u32 * 11;
    let kicker = made.ranks[0].saturating_sub(2) as u32; // 0..=12
    (base + kicker).min(100) as u8
}

fn preflop_score(hole: &[Card]) -> u8 {
    if hole.len() != 2 {
        return 0;
    }
    let high = hole[0].rank_value().max(hole[1].rank_value());
    let low = hole[0].rank_value().min(hole[1].rank_value());
    let paired = hole[0].rank == hole[1].rank;
    let suited = hole[0].suit == hole[1].suit;
    let gap = high - low;

    let mut score = (high as u32 * 3 + low as u32) / 2; // 5..=28
    if paired {
        score += 22;
    } else if gap == 1 {
        score += 5;
    } else if gap == 2 {
        score += 2;
    }
    if suited {
        score += 4;
    }
    // Rescale roughly onto 0..=100 so preflop and postflop share one axis.
    (score * 100 / 58).min(100) as u8
}

/// Monte Carlo equity of the hero hand against `opponents` random hands.
/// Seed the RNG from the situation fingerprint to keep results reproducible
/// for a given schema version.
pub fn monte_carlo_equity<R: Rng + ?Sized>(
    hero: &[Card],
    board_known: &[Card],
    opponents: usize,
    samples: u32,
    rng: &mut R,
) -> f64 {
    debug_assert!(hero.len() == 2, "hero must have two cards");
    let samples = samples.max(1);
    let opponents = opponents.clamp(1, 8);
    let mut equity_sum = 0.0f64;

    for _ in 0..samples {
        let mut deck = standard_deck();
        deck.retain(|c| !hero.contains(c) && !board_known.contains(c));
        deck.shuffle(rng);

        let mut board = board_known.to_vec();
        while board.len() < 5 {
            if let Some(card) = deck.pop() {
                board.push(card);
            }
        }

        let mut hero_cards: Vec<Card> = hero.to_vec();
        hero_cards.extend(board.iter().copied());
        let hero_strength = best_hand(&hero_cards);

        let mut best_rival: Option<ClassedHand> = None;
        for _ in 0..opponents {
            let mut rival_cards = Vec::with_capacity(7);
            if let (Some(a), Some(b)) = (deck.pop(), deck.pop()) {
                rival_cards.push(a);
                rival_cards.push(b);
            } else {
                continue;
            }
            rival_cards.extend(board.iter().copied());
            let strength = best_hand(&rival_cards);
            best_rival = Some(match best_rival {
                Some(current) if current >= strength => current,
                _ => strength,
            });
        }

        match best_rival {
            Some(rival) => match hero_strength.cmp(&rival) {
                Ordering::Greater => equity_sum += 1.0,
                Ordering::Equal => equity_sum += 0.5,
                Ordering::Less => {}
            },
            None => equity_sum += 1.0,
        }
    }

    equity_sum / samples as f64
}
