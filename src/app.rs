use crate::renderer::VulkanContext;
use crate::utils::GameInfo;
use crate::utils::{WINDOW_HEIGHT, WINDOW_WIDTH};
use log::info;
use std::error;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::event_loop::ControlFlow;
use winit::event_loop::EventLoop;
use winit::window::Window;
use winit::window::WindowId;

pub struct AppCTX {
    window: Window,
    #[allow(dead_code)]
    vulkan_ctx: VulkanContext,
}

impl AppCTX {
    fn new(
        game_info: &GameInfo,
        event_loop: &ActiveEventLoop,
    ) -> Result<Self, Box<dyn error::Error>> {
        let window = event_loop.create_window(
            Window::default_attributes()
                .with_title(game_info.app_name.to_string_lossy())
                .with_inner_size(PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT))
                // swapchain recreation on resize is not handled yet
                .with_resizable(false),
        )?;

        let vulkan_ctx = VulkanContext::new(game_info, &window)?;

        Ok(Self { window, vulkan_ctx })
    }
}

pub struct App {
    game_info: GameInfo,
    ctx: Option<AppCTX>,
    setup_error: Option<Box<dyn error::Error>>,
}

impl App {
    pub fn new(game_info: GameInfo) -> Self {
        Self {
            game_info,
            ctx: None,
            setup_error: None,
        }
    }

    pub fn start(&mut self) -> Result<(), Box<dyn error::Error>> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(self)?;

        // a failed init exits the loop; hand the cause back to main
        match self.setup_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.ctx.is_some() || self.setup_error.is_some() {
            return;
        }

        info!(
            "Initialising Game: {}",
            self.game_info.app_name.to_string_lossy()
        );

        match AppCTX::new(&self.game_info, event_loop) {
            Ok(ctx) => self.ctx = Some(ctx),
            Err(error) => {
                self.setup_error = Some(error);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(ctx) = &self.ctx {
                    ctx.window.request_redraw();
                }
            }
            _ => (),
        }
    }
}
