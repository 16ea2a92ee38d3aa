//! Swap-chain layers (spec §3, §4.3): a GPU-backed layer bound to a native
//! view, tracking the currently acquired drawable so `load_swapchain`/
//! `present` can rebind a texture slot to it each frame.

use crate::error::{GsError, GsResult};
use crate::format::{color_to_metal, ColorFormat};
use cocoa::base::id as CocoaId;
use objc::{msg_send, sel, sel_impl};

pub struct SwapChain {
    pub layer: metal::MetalLayer,
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    current_drawable: Option<metal::MetalDrawable>,
}

impl SwapChain {
    /// `native_view` is the host-owned `NSView*`, passed through the ABI
    /// boundary as an opaque pointer (spec §3: "GPU-backed layer bound to a
    /// view").
    pub fn new(
        device: &metal::Device,
        native_view: *mut std::ffi::c_void,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> GsResult<Self> {
        if native_view.is_null() {
            return Err(GsError::ContractViolation(
                "swapchain creation requires a non-null native view".to_string(),
            ));
        }

        let layer = metal::MetalLayer::new();
        layer.set_device(device);
        layer.set_pixel_format(color_to_metal(format));
        layer.set_presents_with_transaction(false);
        layer.set_drawable_size(metal::NSSize::new(width as f64, height as f64));

        unsafe {
            let view = native_view as CocoaId;
            let layer_obj = layer.as_ref() as *const metal::MetalLayerRef as CocoaId;
            let _: () = msg_send![view, setLayer: layer_obj];
            let _: () = msg_send![view, setWantsLayer: true];
        }

        Ok(SwapChain {
            layer,
            width,
            height,
            format,
            current_drawable: None,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.layer
            .set_drawable_size(metal::NSSize::new(width as f64, height as f64));
    }

    /// spec §3 `load_swapchain`: acquires the next drawable. Fatal if a
    /// drawable is already held without an intervening `present` (spec §7:
    /// re-acquiring before present is a host contract violation).
    pub fn acquire_next_drawable(&mut self) -> GsResult<&metal::TextureRef> {
        if self.current_drawable.is_some() {
            return Err(GsError::ContractViolation(
                "load_swapchain called while a drawable is still held".to_string(),
            ));
        }
        let drawable = self
            .layer
            .next_drawable()
            .ok_or_else(|| GsError::ContractViolation("no drawable available from CAMetalLayer".to_string()))?
            .to_owned();
        self.current_drawable = Some(drawable);
        Ok(self.current_drawable.as_ref().unwrap().texture())
    }

    /// spec §3 `present`: releases the acquired drawable.
    pub fn present(&mut self, command_buffer: &metal::CommandBufferRef) -> GsResult<()> {
        let drawable = self
            .current_drawable
            .take()
            .ok_or_else(|| GsError::ContractViolation("present called with no drawable acquired".to_string()))?;
        command_buffer.present_drawable(&drawable);
        Ok(())
    }
}

// `metal::MetalLayer`/`MetalDrawable` wrap Objective-C object references;
// the swapchain is only ever touched from the single host graphics thread
// (spec §5), so `Send` is safe even though the underlying types are not
// `Send` by default.
unsafe impl Send for SwapChain {}
