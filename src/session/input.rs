//! Keyboard and mouse dispatch through the `Input` domain

use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::cdp::CdpClient;
use crate::keys::{self, KeyStroke};
use crate::session::traits::{ClickOptions, MouseButton};
use crate::{Error, Result};

/// Modifier bits that suppress text insertion
const COMMAND_MODIFIERS: u32 = 1 | 2 | 4;

/// Per-page input state: held modifiers and the pressed mouse button
#[derive(Debug)]
pub struct Input {
    client: Arc<dyn CdpClient>,
    modifiers: AtomicU32,
    pressed: Mutex<Option<MouseButton>>,
}

impl Input {
    pub fn new(client: Arc<dyn CdpClient>) -> Self {
        Self {
            client,
            modifiers: AtomicU32::new(0),
            pressed: Mutex::new(None),
        }
    }

    fn modifiers(&self) -> u32 {
        self.modifiers.load(Ordering::SeqCst)
    }

    async fn dispatch_key(&self, kind: &str, stroke: &KeyStroke) -> Result<()> {
        let modifiers = self.modifiers();
        let mut params = json!({
            "type": kind,
            "key": stroke.key,
            "code": stroke.code,
            "windowsVirtualKeyCode": stroke.key_code,
            "modifiers": modifiers,
        });
        if kind == "keyDown" {
            if let Some(text) = &stroke.text {
                params["text"] = json!(text);
                params["unmodifiedText"] = json!(text);
            }
        }
        self.client.call_method("Input.dispatchKeyEvent", params).await?;
        Ok(())
    }

    /// Press a key (held modifiers apply)
    pub async fn key_down(&self, name: &str) -> Result<()> {
        let stroke = keys::describe(name)?;
        let produces_text = stroke.text.is_some() && self.modifiers() & COMMAND_MODIFIERS == 0;
        let kind = if produces_text { "keyDown" } else { "rawKeyDown" };
        self.dispatch_key(kind, &stroke).await?;
        self.modifiers.fetch_or(stroke.modifier_bit(), Ordering::SeqCst);
        Ok(())
    }

    /// Release a key
    pub async fn key_up(&self, name: &str) -> Result<()> {
        let stroke = keys::describe(name)?;
        self.modifiers.fetch_and(!stroke.modifier_bit(), Ordering::SeqCst);
        self.dispatch_key("keyUp", &stroke).await
    }

    /// Type text one character at a time; characters without a key are inserted directly
    pub async fn type_text(&self, text: &str) -> Result<()> {
        for c in text.chars() {
            let stroke = keys::char_stroke(c);
            if stroke.code.is_empty() {
                self.client
                    .call_method("Input.insertText", json!({ "text": c.to_string() }))
                    .await?;
                continue;
            }
            self.dispatch_key("keyDown", &stroke).await?;
            self.dispatch_key("keyUp", &stroke).await?;
        }
        Ok(())
    }

    fn pressed_button(&self) -> Result<Option<MouseButton>> {
        self.pressed
            .lock()
            .map(|b| *b)
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }

    fn set_pressed(&self, button: Option<MouseButton>) -> Result<()> {
        let mut pressed = self
            .pressed
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
        *pressed = button;
        Ok(())
    }

    async fn dispatch_mouse(&self, kind: &str, x: f64, y: f64, button: &str, click_count: u32) -> Result<()> {
        self.client
            .call_method(
                "Input.dispatchMouseEvent",
                json!({
                    "type": kind,
                    "x": x,
                    "y": y,
                    "button": button,
                    "clickCount": click_count,
                    "modifiers": self.modifiers(),
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
        let button = self.pressed_button()?.map_or("none", |b| b.as_str());
        self.dispatch_mouse("mouseMoved", x, y, button, 0).await
    }

    pub async fn mouse_down(&self, x: f64, y: f64, button: MouseButton, click_count: u32) -> Result<()> {
        self.set_pressed(Some(button))?;
        self.dispatch_mouse("mousePressed", x, y, button.as_str(), click_count).await
    }

    pub async fn mouse_up(&self, x: f64, y: f64, button: MouseButton, click_count: u32) -> Result<()> {
        self.set_pressed(None)?;
        self.dispatch_mouse("mouseReleased", x, y, button.as_str(), click_count).await
    }

    /// Move, then press and release `click_count` times
    pub async fn click(&self, x: f64, y: f64, options: &ClickOptions) -> Result<()> {
        self.mouse_move(x, y).await?;
        for count in 1..=options.click_count.max(1) {
            self.mouse_down(x, y, options.button, count).await?;
            self.mouse_up(x, y, options.button, count).await?;
        }
        Ok(())
    }
}
