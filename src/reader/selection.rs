/// 浮动按钮与选区顶部的距离
pub const ANCHOR_GAP: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSelection {
    pub text: String,
    pub bounds: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

/// 选区非空且位于正文容器内时，返回“解释”按钮的位置：选区上方、水平居中
pub fn anchor_for(selection: &TextSelection, container: &Rect) -> Option<Anchor> {
    if selection.text.trim().is_empty() {
        return None;
    }

    let bounds = &selection.bounds;
    let center_y = bounds.top + bounds.height / 2.0;
    if !container.contains_point(bounds.center_x(), center_y) {
        return None;
    }

    Some(Anchor {
        x: bounds.center_x(),
        y: bounds.top - ANCHOR_GAP,
    })
}
