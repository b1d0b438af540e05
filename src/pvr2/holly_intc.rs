// Holly's normal/external/error interrupt status registers (ISTNRM,
// ISTEXT, ISTERR) and their IML2/IML4/IML6 priority-level masks. Holly
// sits behind the SH-4's external IRL group: asserting any unmasked bit
// here is what ultimately drives the `IRQ_IRL*` lines in
// `sh4::intc::InterruptController`, grounded on
// `hw/sys/holly_intc.hpp`'s ISTNRM/ISTEXT/ISTERR/IMLn split. The exact
// bit positions for VBLANK/HBLANK/render-complete are not present in the
// filtered header; the values below are this core's own assignment,
// chosen to keep PVR_RENDER_COMPLETE and the three SPG raster events on
// distinct bits as the hardware does.

use bitflags::bitflags;

bitflags! {
    /// ISTNRM: normal-priority interrupt sources, the ones this core
    /// actually raises (PVR2 render-complete and SPG raster events).
    #[derive(Default)]
    pub struct IstNrm: u32 {
        const PVR_RENDER_COMPLETE = 1 << 0;
        const HBLANK              = 1 << 1;
        const VBLANK_IN           = 1 << 2;
        const VBLANK_OUT          = 1 << 3;
    }
}

/// The three priority-level masks a guest can program: a bit set in
/// `iml2`/`iml4`/`iml6` routes that ISTNRM source to IRL level 2, 4 or 6
/// respectively. Unmasked-everywhere bits never reach the CPU.
#[derive(Default)]
pub struct HollyIntc {
    pub istnrm: IstNrm,
    pub iml2nrm: IstNrm,
    pub iml4nrm: IstNrm,
    pub iml6nrm: IstNrm,
}

impl HollyIntc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, bits: IstNrm) {
        self.istnrm.insert(bits);
    }

    /// Guest acknowledgement: writing 1 to an ISTNRM bit clears it.
    pub fn ack(&mut self, bits: IstNrm) {
        self.istnrm.remove(bits);
    }

    fn masked_at(&self, mask: IstNrm) -> bool {
        !(self.istnrm & mask).is_empty()
    }

    /// The highest IRL level (2, 4 or 6) with an unmasked pending bit, if
    /// any; `None` means Holly currently asserts nothing the guest has
    /// unmasked.
    pub fn highest_pending_level(&self) -> Option<u8> {
        if self.masked_at(self.iml6nrm) {
            Some(6)
        } else if self.masked_at(self.iml4nrm) {
            Some(4)
        } else if self.masked_at(self.iml2nrm) {
            Some(2)
        } else {
            None
        }
    }

    /// The IRL value (0..=0xe, `0xf` for "nothing pending") this core
    /// feeds into `InterruptController::register_irl_line`.
    pub fn irl_value(&self) -> u8 {
        match self.highest_pending_level() {
            Some(level) => 0xf - level,
            None => 0xf,
        }
    }
}
