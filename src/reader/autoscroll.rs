use crate::model::settings::{MAX_SCROLL_SPEED, MIN_SCROLL_SPEED};

/// 每帧滚动距离，按 1..=10 档速度取值
pub const SPEED_TABLE: [f64; 10] = [0.1, 0.2, 0.4, 0.7, 1.0, 1.5, 2.2, 3.0, 4.0, 6.0];

pub fn step_for(speed: u8) -> f64 {
    let speed = speed.clamp(MIN_SCROLL_SPEED, MAX_SCROLL_SPEED);
    SPEED_TABLE[usize::from(speed - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub offset: f64,
    pub content_height: f64,
    pub viewport_height: f64,
}

impl Viewport {
    pub fn max_offset(&self) -> f64 {
        (self.content_height - self.viewport_height).max(0.0)
    }

    pub fn at_bottom(&self) -> bool {
        self.content_height > 0.0 && self.offset >= self.max_offset()
    }

    pub fn scroll_to(&mut self, offset: f64) {
        if !offset.is_finite() {
            return;
        }
        self.offset = if self.content_height > 0.0 {
            offset.clamp(0.0, self.max_offset())
        } else {
            // 尚未排版，先记下目标位置，排版后再收敛
            offset.max(0.0)
        };
    }
}

/// 一次滚动循环的凭据。循环被取消后旧凭据立即失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollToken(u64);

#[derive(Debug)]
pub struct AutoScroller {
    enabled: bool,
    speed: u8,
    active: Option<ScrollToken>,
    issued: u64,
}

impl AutoScroller {
    pub fn new(enabled: bool, speed: u8) -> Self {
        Self {
            enabled,
            speed: speed.clamp(MIN_SCROLL_SPEED, MAX_SCROLL_SPEED),
            active: None,
            issued: 0,
        }
    }

    pub fn configure(&mut self, enabled: bool, speed: u8) {
        self.enabled = enabled;
        self.speed = speed.clamp(MIN_SCROLL_SPEED, MAX_SCROLL_SPEED);
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn active(&self) -> Option<ScrollToken> {
        self.active
    }

    /// 条件允许时保证恰好有一个循环在运行，否则取消
    pub fn sync(&mut self, can_run: bool) -> Option<ScrollToken> {
        match (can_run && self.enabled, self.active) {
            (true, None) => {
                self.issued += 1;
                self.active = Some(ScrollToken(self.issued));
            }
            (false, Some(_)) => self.active = None,
            _ => {}
        }
        self.active
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }

    /// 推进一帧。凭据过期或到达底部时返回 false，驱动方应停止调度。
    pub fn tick(&mut self, token: ScrollToken, viewport: &mut Viewport) -> bool {
        if self.active != Some(token) {
            return false;
        }

        viewport.scroll_to(viewport.offset + step_for(self.speed));
        if viewport.at_bottom() {
            self.active = None;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Viewport {
        Viewport {
            offset: 0.0,
            content_height: 1000.0,
            viewport_height: 800.0,
        }
    }

    #[test]
    fn speed_table_lookup() {
        assert_eq!(step_for(1), 0.1);
        assert_eq!(step_for(5), 1.0);
        assert_eq!(step_for(10), 6.0);
        assert_eq!(step_for(0), 0.1);
        assert_eq!(step_for(42), 6.0);
    }

    #[test]
    fn cancelled_token_stops_advancing() {
        let mut scroller = AutoScroller::new(true, 10);
        let mut viewport = page();
        let token = scroller.sync(true).unwrap();
        assert!(scroller.tick(token, &mut viewport));
        assert_eq!(viewport.offset, 6.0);

        scroller.sync(false);
        assert!(!scroller.tick(token, &mut viewport));
        assert_eq!(viewport.offset, 6.0);

        let resumed = scroller.sync(true).unwrap();
        assert_ne!(resumed, token);
        assert!(!scroller.tick(token, &mut viewport));
        assert!(scroller.tick(resumed, &mut viewport));
        assert_eq!(viewport.offset, 12.0);
    }

    #[test]
    fn repeated_sync_keeps_single_loop() {
        let mut scroller = AutoScroller::new(true, 3);
        let first = scroller.sync(true);
        assert_eq!(scroller.sync(true), first);
    }

    #[test]
    fn disabled_scroller_never_starts() {
        let mut scroller = AutoScroller::new(false, 3);
        assert_eq!(scroller.sync(true), None);
    }

    #[test]
    fn non_finite_offsets_are_ignored() {
        let mut viewport = page();
        viewport.scroll_to(120.0);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            viewport.scroll_to(bad);
            assert_eq!(viewport.offset, 120.0);
        }

        let mut unlaid = Viewport::default();
        unlaid.scroll_to(f64::NAN);
        assert_eq!(unlaid.offset, 0.0);
    }

    #[test]
    fn stops_at_bottom() {
        let mut scroller = AutoScroller::new(true, 10);
        let mut viewport = page();
        viewport.offset = 197.0;
        let token = scroller.sync(true).unwrap();
        assert!(!scroller.tick(token, &mut viewport));
        assert_eq!(viewport.offset, 200.0);
        assert_eq!(scroller.active(), None);
    }
}
