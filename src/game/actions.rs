//! Action gateway: player intent in, protocol requests out.
//!
//! Every entry point is fire-and-forget. A failed precondition (offline,
//! dead, missing target, unresolvable target, bot protection) drops the
//! action; the returned `bool` only says whether a request was forwarded.

use super::stackpos;
use super::types::{Creature, Direction, Outfit, Thing, DEFAULT_CHANNEL, NO_TARGET, SPEAK_SAY};
use super::Game;
use crate::network::ClientRequest;

impl Game {
    /// Online, target present, bot protection passes, in that order.
    fn admit(&self, action: &'static str, has_target: bool) -> bool {
        if !self.online {
            tracing::debug!("[gateway] {} dropped: offline", action);
            return false;
        }
        if !has_target {
            tracing::debug!("[gateway] {} dropped: no target", action);
            return false;
        }
        self.protection.check()
    }

    fn forward(&mut self, request: ClientRequest) -> bool {
        match self.link.as_mut() {
            Some(link) => {
                link.send(request);
                true
            }
            None => false,
        }
    }

    /// Step once; walking while following only stops the follow.
    pub fn walk(&mut self, direction: Direction) -> bool {
        if self.local_player.as_ref().is_some_and(|p| p.is_following()) {
            self.cancel_follow();
            return false;
        }

        if !self.online || self.dead || !self.protection.check() {
            return false;
        }
        let Some(player) = self.local_player.as_mut() else {
            return false;
        };
        if !player.can_walk(direction) {
            tracing::debug!("[gateway] walk {:?} dropped: cannot walk", direction);
            return false;
        }

        player.client_walk(direction);
        self.forward(ClientRequest::Walk(direction))
    }

    /// Face a cardinal direction. Not bot protected.
    pub fn turn(&mut self, direction: Direction) -> bool {
        if !self.online || direction.is_diagonal() {
            return false;
        }
        self.forward(ClientRequest::Turn(direction))
    }

    /// Resolve where `thing` lives for targeted requests; `None` drops the action.
    fn target_address(&self, thing: &Thing) -> Option<u8> {
        let address = stackpos::resolve(&*self.map.borrow(), thing);
        if address.is_none() {
            tracing::debug!("[gateway] thing {} not found in its tile", thing.thing_id());
        }
        address
    }

    pub fn look(&mut self, thing: Option<&Thing>) -> bool {
        if !self.admit("look", thing.is_some()) {
            return false;
        }
        let Some(thing) = thing else { return false };
        let Some(stackpos) = self.target_address(thing) else {
            return false;
        };
        self.forward(ClientRequest::LookAt {
            position: thing.location().wire_position(),
            thing_id: thing.thing_id(),
            stackpos,
        })
    }

    pub fn use_thing(&mut self, thing: Option<&Thing>) -> bool {
        if !self.admit("use", thing.is_some()) {
            return false;
        }
        let Some(thing) = thing else { return false };
        let Some(stackpos) = self.target_address(thing) else {
            return false;
        };
        self.forward(ClientRequest::UseItem {
            position: thing.location().wire_position(),
            thing_id: thing.thing_id(),
            stackpos,
            index: 0,
        })
    }

    pub fn rotate(&mut self, thing: Option<&Thing>) -> bool {
        if !self.admit("rotate", thing.is_some()) {
            return false;
        }
        let Some(thing) = thing else { return false };
        let Some(stackpos) = self.target_address(thing) else {
            return false;
        };
        self.forward(ClientRequest::RotateItem {
            position: thing.location().wire_position(),
            thing_id: thing.thing_id(),
            stackpos,
        })
    }

    /// Interaction address of `thing`, `-1` when it cannot be found.
    pub fn thing_stackpos(&self, thing: &Thing) -> i32 {
        stackpos::thing_stackpos(&*self.map.borrow(), thing)
    }

    pub fn attack(&mut self, creature: Option<&Creature>) -> bool {
        if !self.admit("attack", creature.is_some()) {
            return false;
        }
        let Some(creature) = creature else { return false };

        if self.local_player.as_ref().is_some_and(|p| p.is_following()) {
            self.cancel_follow();
        }
        if let Some(player) = self.local_player.as_mut() {
            player.set_attacking_creature(Some(creature));
        }
        self.forward(ClientRequest::Attack {
            creature_id: creature.id,
        })
    }

    pub fn cancel_attack(&mut self) -> bool {
        if !self.online {
            return false;
        }
        let Some(player) = self.local_player.as_mut() else {
            return false;
        };
        player.set_attacking_creature(None);
        self.forward(ClientRequest::Attack {
            creature_id: NO_TARGET,
        })
    }

    pub fn follow(&mut self, creature: Option<&Creature>) -> bool {
        if !self.admit("follow", creature.is_some()) {
            return false;
        }
        let Some(creature) = creature else { return false };

        if self.local_player.as_ref().is_some_and(|p| p.is_attacking()) {
            self.cancel_attack();
        }
        if let Some(player) = self.local_player.as_mut() {
            player.set_following_creature(Some(creature));
        }
        self.forward(ClientRequest::Follow {
            creature_id: creature.id,
        })
    }

    pub fn cancel_follow(&mut self) -> bool {
        if !self.online {
            return false;
        }
        let Some(player) = self.local_player.as_mut() else {
            return false;
        };
        player.set_following_creature(None);
        self.forward(ClientRequest::Follow {
            creature_id: NO_TARGET,
        })
    }

    /// Say something on the default channel.
    pub fn talk(&mut self, message: &str) -> bool {
        self.talk_channel(SPEAK_SAY, DEFAULT_CHANNEL, message)
    }

    pub fn talk_channel(&mut self, channel_type: u8, channel_id: u16, message: &str) -> bool {
        if !self.admit("talk", true) {
            return false;
        }
        self.forward(ClientRequest::Talk {
            channel_type,
            channel_id,
            receiver: String::new(),
            message: message.to_owned(),
        })
    }

    pub fn talk_private(&mut self, channel_type: u8, receiver: &str, message: &str) -> bool {
        if !self.admit("talk private", true) {
            return false;
        }
        self.forward(ClientRequest::Talk {
            channel_type,
            channel_id: 0,
            receiver: receiver.to_owned(),
            message: message.to_owned(),
        })
    }

    pub fn invite_to_party(&mut self, creature_id: u32) -> bool {
        if !self.admit("party invite", true) {
            return false;
        }
        self.forward(ClientRequest::InviteToParty { creature_id })
    }

    pub fn open_outfit_window(&mut self) -> bool {
        if !self.admit("outfit window", true) {
            return false;
        }
        self.forward(ClientRequest::GetOutfit)
    }

    pub fn set_outfit(&mut self, outfit: &Outfit) -> bool {
        if !self.admit("set outfit", true) {
            return false;
        }
        self.forward(ClientRequest::SetOutfit(*outfit))
    }

    pub fn add_vip(&mut self, name: &str) -> bool {
        if !self.admit("add vip", !name.is_empty()) {
            return false;
        }
        self.forward(ClientRequest::AddVip {
            name: name.to_owned(),
        })
    }

    pub fn remove_vip(&mut self, player_id: u32) -> bool {
        if !self.admit("remove vip", true) {
            return false;
        }
        self.forward(ClientRequest::RemoveVip { player_id })
    }
}
