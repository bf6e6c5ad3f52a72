//! LED signalling for split four-finger scanners.
//!
//! Split four-finger scanners have a progress LED per hand and a green and a
//! red LED per finger. The session lights one hand red while waiting for
//! fingers, blinks both colours while fingers are being placed, and lights the
//! hand green once the image is captured.

use fingerscan_hardware::{Hand, LedPattern};

/// Colour signalled on a hand's finger LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalColor {
    Green,
    Red,
    /// Green and red together, shown as amber.
    Both,
}

/// Finger LEDs of one hand lit green.
fn green_fingers(hand: Hand) -> LedPattern {
    match hand {
        Hand::Left => {
            LedPattern::LEFT_INDEX_GREEN
                | LedPattern::LEFT_MIDDLE_GREEN
                | LedPattern::LEFT_RING_GREEN
                | LedPattern::LEFT_LITTLE_GREEN
        }
        Hand::Right => {
            LedPattern::RIGHT_INDEX_GREEN
                | LedPattern::RIGHT_MIDDLE_GREEN
                | LedPattern::RIGHT_RING_GREEN
                | LedPattern::RIGHT_LITTLE_GREEN
        }
    }
}

/// Finger LEDs of one hand lit red.
fn red_fingers(hand: Hand) -> LedPattern {
    match hand {
        Hand::Left => {
            LedPattern::LEFT_INDEX_RED
                | LedPattern::LEFT_MIDDLE_RED
                | LedPattern::LEFT_RING_RED
                | LedPattern::LEFT_LITTLE_RED
        }
        Hand::Right => {
            LedPattern::RIGHT_INDEX_RED
                | LedPattern::RIGHT_MIDDLE_RED
                | LedPattern::RIGHT_RING_RED
                | LedPattern::RIGHT_LITTLE_RED
        }
    }
}

fn progress(hand: Hand) -> LedPattern {
    match hand {
        Hand::Left => LedPattern::PROGRESS_LEFT_HAND,
        Hand::Right => LedPattern::PROGRESS_RIGHT_HAND,
    }
}

/// LED pattern signalling `color` on `hand`, optionally blinking.
///
/// # Examples
///
/// ```
/// use fingerscan_hardware::{Hand, LedPattern};
/// use fingerscan_session::leds::{hand_pattern, SignalColor};
///
/// let pattern = hand_pattern(SignalColor::Red, false, Hand::Left);
/// assert!(pattern.contains(LedPattern::PROGRESS_LEFT_HAND | LedPattern::LEFT_RING_RED));
/// assert!(!pattern.contains(LedPattern::BLINK_RED));
/// ```
pub fn hand_pattern(color: SignalColor, blink: bool, hand: Hand) -> LedPattern {
    let mut pattern = progress(hand);

    match color {
        SignalColor::Green => pattern |= green_fingers(hand),
        SignalColor::Red => pattern |= red_fingers(hand),
        SignalColor::Both => pattern |= green_fingers(hand) | red_fingers(hand),
    }

    if blink {
        match color {
            SignalColor::Green => pattern |= LedPattern::BLINK_GREEN,
            SignalColor::Red => pattern |= LedPattern::BLINK_RED,
            SignalColor::Both => pattern |= LedPattern::BLINK_GREEN | LedPattern::BLINK_RED,
        }
    }

    pattern
}
