//! The "capture → match → dispatch → sleep" loop and its two instances:
//!
//! - [`tracker::CodeTracker`]: polls a page for gift codes and mails new ones
//! - [`automaton::AutomatonPipeline`]: drives the game through adb based on
//!   template matches
//!
//! Both are [`scheduler::Pipeline`]s driven by a [`scheduler::Scheduler`].

pub mod automaton;
pub mod config;
pub mod dispatcher;
pub mod resource;
pub mod scheduler;
pub mod task;
pub mod tracker;
pub mod vision;

pub use config::Config;

/// Capture the screen once per tick and reuse it until something changes it
pub trait CachedScreenCapper {
    fn screen_cache_or_cap(&self) -> anyhow::Result<image::DynamicImage>;
    fn screen_cap_and_cache(&self) -> anyhow::Result<image::DynamicImage>;
    fn invalidate_screen_cache(&self);
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::{cell::RefCell, time::Duration};

    use image::{DynamicImage, GrayImage, Luma};
    use wos_controller::{Controller, Key};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Op {
        Click(u32, u32),
        Swipe((u32, u32), (u32, u32), Duration),
        Text(String),
        Press(Key),
        Screencap,
        Reconnect,
    }

    /// A device that records every operation and shows a fixed screen
    pub struct FakeController {
        pub screen: DynamicImage,
        pub ops: RefCell<Vec<Op>>,
        pub fail_clicks: bool,
    }

    impl FakeController {
        pub fn new(screen: DynamicImage) -> Self {
            Self {
                screen,
                ops: RefCell::new(vec![]),
                fail_clicks: false,
            }
        }

        pub fn ops(&self) -> Vec<Op> {
            self.ops.borrow().clone()
        }

        pub fn clicks(&self) -> Vec<(u32, u32)> {
            self.ops
                .borrow()
                .iter()
                .filter_map(|op| match op {
                    Op::Click(x, y) => Some((*x, *y)),
                    _ => None,
                })
                .collect()
        }
    }

    impl Controller for FakeController {
        fn screen_size(&self) -> (u32, u32) {
            (self.screen.width(), self.screen.height())
        }
        fn click(&self, x: u32, y: u32) -> anyhow::Result<()> {
            if self.fail_clicks {
                anyhow::bail!("device went away");
            }
            self.ops.borrow_mut().push(Op::Click(x, y));
            Ok(())
        }
        fn swipe(
            &self,
            start: (u32, u32),
            end: (u32, u32),
            duration: Duration,
        ) -> anyhow::Result<()> {
            self.ops.borrow_mut().push(Op::Swipe(start, end, duration));
            Ok(())
        }
        fn input_text(&self, text: &str) -> anyhow::Result<()> {
            self.ops.borrow_mut().push(Op::Text(text.to_string()));
            Ok(())
        }
        fn press(&self, key: Key) -> anyhow::Result<()> {
            self.ops.borrow_mut().push(Op::Press(key));
            Ok(())
        }
        fn raw_screencap(&self) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("raw screencap is not supported by FakeController")
        }
        fn screencap(&self) -> anyhow::Result<DynamicImage> {
            self.ops.borrow_mut().push(Op::Screencap);
            Ok(self.screen.clone())
        }
        fn reconnect(&mut self) -> anyhow::Result<()> {
            self.ops.borrow_mut().push(Op::Reconnect);
            Ok(())
        }
    }

    pub fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Deterministic pseudo random texture, so a crop of it only fits once
    pub fn noise_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let mut h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263);
            h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
            Luma([(h >> 24) as u8])
        })
    }
}
