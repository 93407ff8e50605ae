//! Classic BPF program selecting AppleTalk traffic, equivalent to the
//! pcap expression `atalk or aarp` on an Ethernet link.

use libc::sock_filter;

const BPF_LDH_ABS: u16 = 0x28;
const BPF_LDB_ABS: u16 = 0x30;
const BPF_LD_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x15;
const BPF_JGT: u16 = 0x25;
const BPF_RET: u16 = 0x06;

fn insn(code: u16, jt: u8, jf: u8, k: u32) -> sock_filter {
    sock_filter { code, jt, jf, k }
}

/// Accepts 802.3 frames whose LLC is SNAP with the AppleTalk
/// (08:00:07/0x809B) or AARP (00:00:00/0x80F3) protocol, and Ethernet II
/// frames carrying the bare AppleTalk or AARP ethertypes.
///
/// ```text
///        ldh  [12]                    ; 802.3 length, or an ethertype
///        jgt  #1500, ethertype
///        ldh  [14]
///        jne  #0xaaaa, drop           ; LLC DSAP/SSAP
///        ldb  [16]
///        jne  #0x03, drop             ; LLC control: unnumbered information
///        ld   [17]                    ; OUI plus first protocol byte
///        jeq  #0x08000780, atalk_lo
///        jeq  #0x00000080, aarp_lo
///        jmp  drop
/// atalk_lo: ldb [21]
///        jeq  #0x9b, accept, drop
/// aarp_lo:  ldb [21]
///        jeq  #0xf3, accept, drop
/// ethertype: jeq #0x809b, accept
///        jeq  #0x80f3, accept, drop
/// accept: ret #-1
/// drop:  ret #0
/// ```
pub fn appletalk_filter() -> [sock_filter; 17] {
    [
        insn(BPF_LDH_ABS, 0, 0, 12),            //  0
        insn(BPF_JGT, 11, 0, 1500),             //  1: -> 13 (ethertype)
        insn(BPF_LDH_ABS, 0, 0, 14),            //  2
        insn(BPF_JEQ, 0, 12, 0x0000_aaaa),      //  3: != -> 16 (drop)
        insn(BPF_LDB_ABS, 0, 0, 16),            //  4
        insn(BPF_JEQ, 0, 10, 0x0000_0003),      //  5: != -> 16
        insn(BPF_LD_ABS, 0, 0, 17),             //  6
        insn(BPF_JEQ, 0, 2, 0x0800_0780),       //  7: == -> 8, != -> 10
        insn(BPF_LDB_ABS, 0, 0, 21),            //  8
        insn(BPF_JEQ, 5, 6, 0x0000_009b),       //  9: -> 15 / 16
        insn(BPF_JEQ, 0, 5, 0x0000_0080),       // 10: == -> 11, != -> 16
        insn(BPF_LDB_ABS, 0, 0, 21),            // 11
        insn(BPF_JEQ, 2, 3, 0x0000_00f3),       // 12: -> 15 / 16
        insn(BPF_JEQ, 1, 0, 0x0000_809b),       // 13: -> 15, else 14
        insn(BPF_JEQ, 0, 1, 0x0000_80f3),       // 14: -> 15 / 16
        insn(BPF_RET, 0, 0, 0xffff_ffff),       // 15: accept
        insn(BPF_RET, 0, 0, 0),                 // 16: drop
    ]
}
