//! Button-driven interaction: menu browsing, value editing and the ringing
//! state. All three run to completion inside the control cycle; the shared
//! blocking wait is the only way input reaches them.

use crate::alarm::AlarmBank;
use crate::device::Board;
use crate::types::ButtonId;

pub const MENU_LEN: usize = 5;
pub const MENU_ENTRIES: [&str; MENU_LEN] = [
    "Set timezone",
    "Set alarm 1",
    "Set alarm 2",
    "Set alarm 3",
    "Disable alarms",
];

pub const TZ_HOUR_MIN: i32 = -12;
pub const TZ_HOUR_MAX: i32 = 14;

/// Wake melody, (frequency Hz, duration ms). Cancel is polled between
/// every note.
pub const ALARM_MELODY: [(u16, u64); 8] = [
    (659, 180),
    (784, 180),
    (988, 240),
    (784, 180),
    (659, 180),
    (988, 240),
    (1175, 320),
    (988, 240),
];

const MENU_POS: (i32, i32) = (0, 24);
const RING_MESSAGE: &str = "WAKE UP!";

/// Move the menu cursor one step with wraparound in both directions.
pub fn move_cursor(cursor: usize, delta: i32) -> usize {
    (cursor as i32 + delta).rem_euclid(MENU_LEN as i32) as usize
}

/// Menu browse loop. Up/Down move the cursor, Ok dispatches the selected
/// action and then returns to the idle clock, Cancel leaves without acting.
pub fn run_menu<B: Board>(
    board: &mut B,
    cursor: &mut usize,
    bank: &mut AlarmBank,
    tz_offset: &mut i32,
) {
    loop {
        board.render(MENU_ENTRIES[*cursor], MENU_POS.0, MENU_POS.1, 1, true);
        match board.wait_for_press(None) {
            Some(ButtonId::Up) => *cursor = move_cursor(*cursor, -1),
            Some(ButtonId::Down) => *cursor = move_cursor(*cursor, 1),
            Some(ButtonId::Ok) => {
                match *cursor {
                    0 => edit_timezone(board, tz_offset),
                    slot @ 1..=3 => edit_alarm(board, bank, slot - 1),
                    _ => bank.disable_all(),
                }
                break;
            }
            Some(ButtonId::Cancel) | None => break,
        }
    }
    board.clear_display();
}

/// Single-field editor shared by the timezone and alarm flows.
///
/// Up increments and wraps to `min` past `max`; Down decrements and wraps
/// to `max` past `min`. Ok commits the shown value, Cancel hands back
/// `initial` untouched.
pub fn edit_value<B: Board>(
    board: &mut B,
    initial: i32,
    min: i32,
    max: i32,
    prompt: &str,
) -> i32 {
    let mut value = initial;
    loop {
        board.render(
            &format!("{prompt}: {value}"),
            MENU_POS.0,
            MENU_POS.1,
            1,
            true,
        );
        match board.wait_for_press(None) {
            Some(ButtonId::Up) => value = if value >= max { min } else { value + 1 },
            Some(ButtonId::Down) => value = if value <= min { max } else { value - 1 },
            Some(ButtonId::Ok) => return value,
            // A timeout aborts like Cancel; callers currently never set one.
            Some(ButtonId::Cancel) | None => return initial,
        }
    }
}

/// Hour-then-minute edit of one alarm slot. The two fields are independent
/// editor runs and both returned values are written back unconditionally, so
/// cancelling the minute field still commits an hour confirmed with Ok. The
/// write-back also clears the slot's firing latch.
fn edit_alarm<B: Board>(board: &mut B, bank: &mut AlarmBank, slot: usize) {
    let current = bank.entry(slot);
    let hour = edit_value(board, i32::from(current.hour), 0, 23, "Alarm hour");
    let minute = edit_value(board, i32::from(current.minute), 0, 59, "Alarm minute");
    bank.set_time(slot, hour as u8, minute as u8);
}

/// Hour-then-minute edit of the timezone offset. Same two-field write-back
/// behavior as the alarm edit. Decomposition uses euclidean division so
/// negative offsets round-trip through the editor unchanged.
fn edit_timezone<B: Board>(board: &mut B, tz_offset: &mut i32) {
    let hour = edit_value(
        board,
        tz_offset.div_euclid(3600),
        TZ_HOUR_MIN,
        TZ_HOUR_MAX,
        "UTC offset hours",
    );
    let minute = edit_value(board, tz_offset.rem_euclid(3600) / 60, 0, 59, "UTC offset min");
    *tz_offset = hour * 3600 + minute * 60;
}

/// The ringing state. Repeats the melody until Cancel reads pressed; the
/// other buttons have no effect here. Cancel is checked before every note so
/// the ring stops mid-melody.
pub fn ring<B: Board>(board: &mut B) {
    board.render(RING_MESSAGE, 0, 24, 2, true);
    board.set_alert_led(true);
    'ringing: loop {
        for (freq_hz, duration_ms) in ALARM_MELODY {
            if board.is_pressed(ButtonId::Cancel) {
                break 'ringing;
            }
            board.play_note(freq_hz, duration_ms);
        }
    }
    board.set_alert_led(false);
    board.clear_display();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use std::collections::VecDeque;
    use std::time::Duration;

    use crate::alarm::Alarm;
    use crate::types::{ClimateReading, ClockTime};

    struct ScriptedBoard {
        presses: VecDeque<ButtonId>,
        cancel_after_notes: usize,
        notes: Vec<(u16, u64)>,
        rendered: Vec<String>,
        alert_led: Vec<bool>,
        cleared: usize,
    }

    impl ScriptedBoard {
        fn with_presses(presses: &[ButtonId]) -> Self {
            Self {
                presses: presses.iter().copied().collect(),
                cancel_after_notes: 0,
                notes: Vec::new(),
                rendered: Vec::new(),
                alert_led: Vec::new(),
                cleared: 0,
            }
        }

        fn ringing(cancel_after_notes: usize) -> Self {
            Self {
                cancel_after_notes,
                ..Self::with_presses(&[])
            }
        }
    }

    impl Board for ScriptedBoard {
        fn wait_for_press(&mut self, _timeout: Option<Duration>) -> Option<ButtonId> {
            self.presses.pop_front()
        }

        fn is_pressed(&mut self, button: ButtonId) -> bool {
            button == ButtonId::Cancel && self.notes.len() >= self.cancel_after_notes
        }

        fn render(&mut self, text: &str, _x: i32, _y: i32, _size: u8, _clear_first: bool) {
            self.rendered.push(text.to_string());
        }

        fn clear_display(&mut self) {
            self.cleared += 1;
        }

        fn set_alert_led(&mut self, on: bool) {
            self.alert_led.push(on);
        }

        fn set_warn_led(&mut self, _on: bool) {}

        fn play_note(&mut self, freq_hz: u16, duration_ms: u64) {
            self.notes.push((freq_hz, duration_ms));
        }

        fn set_blind_angle(&mut self, _angle: i32) {}

        fn read_light_raw(&mut self) -> u16 {
            0
        }

        fn read_climate(&mut self) -> Option<ClimateReading> {
            None
        }

        fn now(&mut self, _offset_seconds: i32) -> ClockTime {
            ClockTime {
                hour: 0,
                minute: 0,
                second: 0,
            }
        }

        fn sleep_ms(&mut self, _ms: u64) {}
    }

    #[test]
    fn cursor_wraps_both_directions() {
        assert_eq!(move_cursor(0, -1), MENU_LEN - 1);
        assert_eq!(move_cursor(MENU_LEN - 1, 1), 0);
        assert_eq!(move_cursor(2, 1), 3);
        assert_eq!(move_cursor(2, -1), 1);
    }

    #[test]
    fn every_cursor_position_stays_in_range() {
        for cursor in 0..MENU_LEN {
            for delta in [-1, 1] {
                assert!(move_cursor(cursor, delta) < MENU_LEN);
            }
        }
    }

    #[test]
    fn edit_value_up_visits_every_value_once_per_cycle() {
        let mut presses = vec![ButtonId::Up; 6];
        presses.push(ButtonId::Ok);
        let mut board = ScriptedBoard::with_presses(&presses);
        let value = edit_value(&mut board, 0, 0, 5, "v");

        // Six Up presses from 0 over [0, 5] come full circle.
        assert_eq!(value, 0);
        let shown: Vec<&str> = board.rendered.iter().map(String::as_str).collect();
        assert_eq!(shown, vec!["v: 0", "v: 1", "v: 2", "v: 3", "v: 4", "v: 5", "v: 0"]);
    }

    #[test]
    fn edit_value_down_wraps_to_max() {
        let mut board = ScriptedBoard::with_presses(&[ButtonId::Down, ButtonId::Ok]);
        assert_eq!(edit_value(&mut board, 0, 0, 59, "v"), 59);
    }

    #[test]
    fn edit_value_cancel_returns_initial() {
        let mut board =
            ScriptedBoard::with_presses(&[ButtonId::Up, ButtonId::Up, ButtonId::Cancel]);
        assert_eq!(edit_value(&mut board, 10, 0, 23, "v"), 10);
    }

    #[test]
    fn menu_browse_wraps_upward() {
        let mut board = ScriptedBoard::with_presses(&[ButtonId::Up, ButtonId::Cancel]);
        let mut cursor = 0;
        let mut bank = AlarmBank::default();
        let mut tz = 0;

        run_menu(&mut board, &mut cursor, &mut bank, &mut tz);

        assert_eq!(cursor, MENU_LEN - 1);
        assert_eq!(
            board.rendered,
            vec!["Set timezone".to_string(), "Disable alarms".to_string()]
        );
        assert_eq!(board.cleared, 1);
    }

    #[test]
    fn alarm_edit_commits_both_fields() {
        // Ok on entry 1, hour 0->1 Ok, minute 0->1 Ok.
        let mut board = ScriptedBoard::with_presses(&[
            ButtonId::Ok,
            ButtonId::Up,
            ButtonId::Ok,
            ButtonId::Up,
            ButtonId::Ok,
        ]);
        let mut cursor = 1;
        let mut bank = AlarmBank::default();
        let mut tz = 0;

        run_menu(&mut board, &mut cursor, &mut bank, &mut tz);

        assert_eq!(
            bank.entry(0),
            Alarm {
                hour: 1,
                minute: 1,
                triggered: false
            }
        );
        assert!(bank.enabled());
    }

    #[test]
    fn cancel_on_minute_still_commits_hour() {
        // Hour confirmed with Ok, minute cancelled: both write back anyway.
        let mut board = ScriptedBoard::with_presses(&[
            ButtonId::Ok,
            ButtonId::Up,
            ButtonId::Ok,
            ButtonId::Cancel,
        ]);
        let mut cursor = 2;
        let mut bank = AlarmBank::default();
        bank.set_time(1, 6, 30);
        bank.mark_fired(1);
        let mut tz = 0;

        run_menu(&mut board, &mut cursor, &mut bank, &mut tz);

        assert_eq!(
            bank.entry(1),
            Alarm {
                hour: 7,
                minute: 30,
                triggered: false
            }
        );
    }

    #[test]
    fn disable_all_through_menu() {
        let mut board = ScriptedBoard::with_presses(&[ButtonId::Ok]);
        let mut cursor = MENU_LEN - 1;
        let mut bank = AlarmBank::default();
        bank.set_time(0, 6, 30);
        let mut tz = 0;

        run_menu(&mut board, &mut cursor, &mut bank, &mut tz);

        assert!(!bank.enabled());
        assert_eq!(
            bank.entry(0),
            Alarm {
                hour: 0,
                minute: 0,
                triggered: true
            }
        );
    }

    #[test]
    fn timezone_edit_composes_offset() {
        // Hours 0 -> -1 (Down, Ok), minutes 0 -> 1 (Up, Ok).
        let mut board = ScriptedBoard::with_presses(&[
            ButtonId::Ok,
            ButtonId::Down,
            ButtonId::Ok,
            ButtonId::Up,
            ButtonId::Ok,
        ]);
        let mut cursor = 0;
        let mut bank = AlarmBank::default();
        let mut tz = 0;

        run_menu(&mut board, &mut cursor, &mut bank, &mut tz);

        assert_eq!(tz, -3600 + 60);
    }

    #[test]
    fn timezone_hour_wraps_below_minus_twelve() {
        let mut board = ScriptedBoard::with_presses(&[
            ButtonId::Ok,
            ButtonId::Down,
            ButtonId::Ok,
            ButtonId::Ok,
        ]);
        let mut cursor = 0;
        let mut bank = AlarmBank::default();
        let mut tz = TZ_HOUR_MIN * 3600;

        run_menu(&mut board, &mut cursor, &mut bank, &mut tz);

        assert_eq!(tz, TZ_HOUR_MAX * 3600);
    }

    #[test]
    fn negative_offset_round_trips_unchanged() {
        // -8h plus 40min of positive minute component.
        let initial = -8 * 3600 + 40 * 60;
        let mut board =
            ScriptedBoard::with_presses(&[ButtonId::Ok, ButtonId::Ok, ButtonId::Ok]);
        let mut cursor = 0;
        let mut bank = AlarmBank::default();
        let mut tz = initial;

        run_menu(&mut board, &mut cursor, &mut bank, &mut tz);

        assert_eq!(tz, initial);
    }

    #[test]
    fn ring_stops_the_instant_cancel_reads_low() {
        let mut board = ScriptedBoard::ringing(3);

        ring(&mut board);

        assert_eq!(board.notes.len(), 3);
        assert_eq!(board.alert_led, vec![true, false]);
        assert_eq!(board.cleared, 1);
        assert_eq!(board.rendered, vec![RING_MESSAGE.to_string()]);
    }

    #[test]
    fn ring_repeats_the_melody_until_cancelled() {
        let mut board = ScriptedBoard::ringing(ALARM_MELODY.len() + 2);

        ring(&mut board);

        assert_eq!(board.notes.len(), ALARM_MELODY.len() + 2);
        assert_eq!(board.notes[0], board.notes[ALARM_MELODY.len()]);
    }
}
