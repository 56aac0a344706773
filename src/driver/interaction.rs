//! Element, keyboard and mouse actions

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, instrument};

use super::wait::{observe, run_with_waits};
use super::{Driver, Locator};
use crate::config::Options;
use crate::keys::parse_combo;
use crate::session::traits::{ClickOptions, MouseButton};
use crate::{Error, Result};

const HIGHLIGHT_JS: &str = r#"(node) => {
    const target = node.nodeType === Node.TEXT_NODE ? node.parentElement : node;
    target.style.outline = '0.2em solid red';
}"#;

/// Low-level mouse action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Move,
    Release,
}

impl FromStr for MouseAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "press" => Ok(MouseAction::Press),
            "move" => Ok(MouseAction::Move),
            "release" => Ok(MouseAction::Release),
            _ => Err(Error::invalid_argument(
                "Unknown action, Please set one of the given press\nmove\nrelease",
            )),
        }
    }
}

impl Driver {
    /// Click an element
    #[instrument(skip(self, locator, options))]
    pub async fn click<L: Into<Locator>>(&self, locator: L, options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        let element = self.locate(locator.into(), &settings)?.element_handle().await?;
        run_with_waits(&page, &settings, element.click(&ClickOptions::default())).await
    }

    pub async fn hover<L: Into<Locator>>(&self, locator: L, options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        let element = self.locate(locator.into(), &settings)?.element_handle().await?;
        run_with_waits(&page, &settings, element.hover()).await
    }

    pub async fn focus<L: Into<Locator>>(&self, locator: L, options: &Options) -> Result<()> {
        self.page()?;
        let settings = self.settings(options);
        let element = self.locate(locator.into(), &settings)?.element_handle().await?;
        element.focus().await?;
        observe(&settings).await;
        Ok(())
    }

    /// Fill an element with `text`, or type it into the focused element when no locator is given
    #[instrument(skip(self, locator, options))]
    pub async fn write(&self, text: &str, locator: Option<Locator>, options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        match locator {
            Some(locator) => {
                let element = self.locate(locator, &settings)?.element_handle().await?;
                run_with_waits(&page, &settings, element.fill(text)).await
            }
            None => run_with_waits(&page, &settings, page.type_text(text)).await,
        }
    }

    /// Empty an element, or select-all + delete in the focused one
    #[instrument(skip(self, locator, options))]
    pub async fn clear(&self, locator: Option<Locator>, options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        match locator {
            Some(locator) => {
                let element = self.locate(locator, &settings)?.element_handle().await?;
                run_with_waits(&page, &settings, element.fill("")).await
            }
            None => {
                let keyboard = async {
                    page.key_down("Control").await?;
                    page.key_down("KeyA").await?;
                    page.key_up("KeyA").await?;
                    page.key_up("Control").await?;
                    page.key_down("Delete").await?;
                    page.key_up("Delete").await
                };
                run_with_waits(&page, &settings, keyboard).await
            }
        }
    }

    /// Press keys in order; each entry may be a combination such as `Control+A`
    #[instrument(skip(self, options))]
    pub async fn press(&self, keys: &[&str], options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        let combos = keys
            .iter()
            .map(|combo| parse_combo(combo))
            .collect::<Result<Vec<_>>>()?;

        let typing = async {
            for strokes in &combos {
                for stroke in strokes {
                    page.key_down(&stroke.key).await?;
                }
                for stroke in strokes.iter().rev() {
                    page.key_up(&stroke.key).await?;
                }
            }
            Ok::<(), Error>(())
        };
        run_with_waits(&page, &settings, typing).await
    }

    /// Set the file of an `<input type=file>`
    #[instrument(skip(self, locator, options))]
    pub async fn attach<L: Into<Locator>>(&self, file_path: &Path, locator: L, options: &Options) -> Result<()> {
        self.page()?;
        let settings = self.settings(options);
        let path: PathBuf = if file_path.is_absolute() {
            file_path.to_path_buf()
        } else {
            std::env::current_dir()?.join(file_path)
        };
        let element = self.locate(locator.into(), &settings)?.element_handle().await?;
        element.set_input_files(&[path]).await?;
        observe(&settings).await;
        Ok(())
    }

    /// Press, move or release the mouse at an element's center or at `coords`
    #[instrument(skip(self, locator, options))]
    pub async fn mouse_action(
        &self,
        action: &str,
        locator: Option<Locator>,
        coords: Option<(f64, f64)>,
        options: &Options,
    ) -> Result<()> {
        let action: MouseAction = action.parse()?;
        let page = self.page()?;
        let settings = self.settings(options);

        let (x, y) = match locator {
            Some(locator) => {
                let selector = self.locate(locator, &settings)?;
                let element = selector.element_handle().await?;
                element
                    .bounding_box()
                    .await?
                    .ok_or_else(|| Error::element_not_found(format!("{} is not rendered", selector.description())))?
                    .center()
            }
            None => coords.ok_or_else(|| Error::invalid_argument("Coordinates or a selector are required"))?,
        };
        debug!("Mouse {:?} at ({}, {})", action, x, y);

        match action {
            MouseAction::Press => page.mouse_down(x, y, MouseButton::Left).await?,
            MouseAction::Move => page.mouse_move(x, y).await?,
            MouseAction::Release => page.mouse_up(x, y, MouseButton::Left).await?,
        }
        observe(&settings).await;
        Ok(())
    }

    /// Scroll an element into view
    pub async fn scroll_to<L: Into<Locator>>(&self, locator: L, options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        let element = self.locate(locator.into(), &settings)?.element_handle().await?;
        run_with_waits(&page, &settings, element.scroll_into_view()).await
    }

    /// Outline an element in red
    pub async fn highlight<L: Into<Locator>>(&self, locator: L, options: &Options) -> Result<()> {
        self.page()?;
        let settings = self.settings(options);
        let element = self.locate(locator.into(), &settings)?.element_handle().await?;
        element.evaluate(HIGHLIGHT_JS, &[]).await?;
        Ok(())
    }

    /// Run `function` on an element (as its first argument) or in the page, returning its JSON result
    #[instrument(skip(self, locator, args, options))]
    pub async fn evaluate(
        &self,
        locator: Option<Locator>,
        function: &str,
        args: &[Value],
        options: &Options,
    ) -> Result<Value> {
        let page = self.page()?;
        let settings = self.settings(options);
        match locator {
            Some(locator) => {
                let element = self.locate(locator, &settings)?.element_handle().await?;
                run_with_waits(&page, &settings, element.evaluate(function, args)).await
            }
            None => run_with_waits(&page, &settings, page.evaluate(function, args)).await,
        }
    }

    /// PNG bytes of the page, or clipped to an element
    pub async fn screenshot(&self, locator: Option<Locator>) -> Result<Vec<u8>> {
        let page = self.page()?;
        let clip = match locator {
            Some(locator) => {
                let settings = self.settings(&Options::default());
                let selector = self.locate(locator, &settings)?;
                let element = selector.element_handle().await?;
                element.scroll_into_view().await?;
                Some(
                    element
                        .bounding_box()
                        .await?
                        .ok_or_else(|| Error::element_not_found(format!("{} is not rendered", selector.description())))?,
                )
            }
            None => None,
        };
        page.screenshot(clip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mouse_action_names() {
        assert_eq!("press".parse::<MouseAction>().unwrap(), MouseAction::Press);
        assert_eq!("release".parse::<MouseAction>().unwrap(), MouseAction::Release);
        let err = "drag".parse::<MouseAction>().unwrap_err();
        assert!(err.to_string().contains("press\nmove\nrelease"));
    }
}
