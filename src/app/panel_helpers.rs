//! Locating concrete panels behind `Box<dyn Panel>`.
//!
//! The app keeps its panels in two lists (side dock and central area); these
//! helpers search both by concrete type.

use crate::panels::map_ui::MapPanel;
use crate::panels::panel_trait::Panel;
use crate::panels::plot_ui::PlotPanel;

use super::QcApp;

impl QcApp {
    fn all_panels_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Panel>> {
        self.side_panels
            .iter_mut()
            .chain(self.central_panels.iter_mut())
    }

    pub(crate) fn panel_mut<T: Panel>(&mut self) -> Option<&mut T> {
        self.all_panels_mut()
            .find_map(|p| p.downcast_mut::<T>())
    }

    pub(crate) fn panel_ref<T: Panel>(&self) -> Option<&T> {
        self.side_panels
            .iter()
            .chain(self.central_panels.iter())
            .find_map(|p| p.downcast_ref::<T>())
    }

    /// The main plot, if the app has one.
    pub(crate) fn plot_panel_mut(&mut self) -> Option<&mut PlotPanel> {
        self.panel_mut::<PlotPanel>()
    }

    pub(crate) fn map_panel(&self) -> Option<&MapPanel> {
        self.panel_ref::<MapPanel>()
    }

    /// Toggle the first panel of type `T`: a docked, visible panel is hidden,
    /// anything else becomes visible and docked.
    ///
    /// Returns `true` if such a panel exists.
    pub fn toggle_panel_visibility<T: Panel>(&mut self) -> bool {
        let Some(p) = self.all_panels_mut().find(|p| p.downcast_ref::<T>().is_some()) else {
            return false;
        };
        let st = p.state_mut();
        let shown = st.visible && !st.detached;
        st.visible = !shown;
        st.detached = false;
        if st.visible {
            st.request_focus = true;
        }
        true
    }
}
